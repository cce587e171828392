use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "diskscope")]
#[command(author, version, about = "Disk usage explorer: volumes, directory sizes, cleanup")]
pub struct Cli {
    /// Settings JSON file (autoRefresh, refreshIntervalSecs, excludedPaths, showHidden)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Scan cache file (defaults to the per-user data directory)
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List mounted volumes with capacity and usage
    Volumes {
        /// Re-run the platform command instead of using the cached list
        #[arg(long)]
        refresh: bool,
    },
    /// Measure a directory and show its largest children
    Analyze {
        /// Path to analyse ("root" for the primary volume)
        path: String,
        /// Ignore any cached result
        #[arg(long)]
        refresh: bool,
        /// Directory levels measured exactly
        #[arg(long)]
        depth: Option<usize>,
        /// Tree levels printed
        #[arg(long, default_value_t = 1)]
        show: usize,
        /// Also list the N largest files
        #[arg(long)]
        top: Option<usize>,
        /// Follow symbolic links while measuring
        #[arg(long)]
        follow_links: bool,
    },
    /// Delete a file or directory tree
    Delete {
        path: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
