//! DiskScope — disk usage explorer.
//!
//! Thin binary entry point. All logic lives in the `diskscope-core` crate;
//! this file wires logging, settings and the engine to a command line.

mod cli;

use anyhow::{bail, Context, Result};
use cli::{Cli, Commands};
use diskscope_core::analysis::largest_files;
use diskscope_core::model::size::{format_node_size, format_size};
use diskscope_core::{Engine, EngineConfig, Settings, SizedNode, StaticSettings};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialise structured logging on stderr so JSON output stays clean.
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = match &cli.settings {
        Some(path) => Settings::load_json(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let mut config = EngineConfig::default();
    if let Some(cache) = &cli.cache {
        config = config.with_cache_path(cache);
    }
    if let Commands::Analyze {
        depth, follow_links, ..
    } = &cli.command
    {
        if let Some(depth) = depth {
            config.max_depth = *depth;
        }
        config.follow_links = *follow_links;
    }

    let engine = Engine::open(config, Arc::new(StaticSettings(settings)))
        .context("starting the engine")?;

    let code = match cli.command {
        Commands::Volumes { refresh } => run_volumes(&engine, refresh, cli.json).await?,
        Commands::Analyze {
            path,
            refresh,
            show,
            top,
            ..
        } => run_analyze(&engine, &path, refresh, show, top, cli.json).await?,
        Commands::Delete { path, yes } => run_delete(&engine, &path, yes, cli.json).await?,
    };

    engine.persist().context("saving the scan cache")?;
    Ok(code)
}

async fn run_volumes(engine: &Engine, refresh: bool, json: bool) -> Result<ExitCode> {
    let listing = engine.list_volumes(refresh).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(ExitCode::SUCCESS);
    }

    if listing.degraded {
        eprintln!("warning: volume enumeration failed; figures may be stale or approximate");
    }
    println!(
        "{:<24} {:>10} {:>10} {:>10} {:>6}",
        "VOLUME", "SIZE", "USED", "FREE", "USE%"
    );
    for v in &listing.volumes {
        println!(
            "{:<24} {:>10} {:>10} {:>10} {:>5.1}%{}",
            v.path,
            format_size(v.total_bytes),
            format_size(v.used_bytes),
            format_size(v.available_bytes),
            v.usage_percent(),
            if v.approximate { " (approx.)" } else { "" }
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_analyze(
    engine: &Engine,
    path: &str,
    refresh: bool,
    show: usize,
    top: Option<usize>,
    json: bool,
) -> Result<ExitCode> {
    let analysis = match engine.analyze(path, refresh).await {
        Ok(analysis) => analysis,
        Err(failure) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
                return Ok(ExitCode::from(2));
            }
            bail!("{failure}");
        }
    };
    let largest = top.map(|n| largest_files(&analysis.tree, &analysis.path_key, n));

    if json {
        let mut value = serde_json::to_value(&analysis)?;
        if let Some(largest) = &largest {
            value["largestFiles"] = serde_json::to_value(largest)?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{}  {}  ({}computed {})",
        analysis.path_key,
        format_node_size(&analysis.tree),
        if analysis.from_cache { "cached, " } else { "" },
        analysis.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
    );
    print_children(&analysis.tree, 1, show);

    if let Some(largest) = largest {
        println!();
        println!("Largest files:");
        for file in largest {
            println!("  {:>10}  {}", format_size(file.size_bytes), file.path);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_children(node: &SizedNode, level: usize, max_level: usize) {
    if level > max_level {
        return;
    }
    for child in &node.children {
        let pct = if node.size_bytes > 0 {
            child.size_bytes as f64 / node.size_bytes as f64 * 100.0
        } else {
            0.0
        };
        println!(
            "{:indent$}{:>10} {:>5.1}%  {}{}",
            "",
            format_node_size(child),
            pct,
            child.name,
            if child.is_dir() { "/" } else { "" },
            indent = level * 2
        );
        print_children(child, level + 1, max_level);
    }
}

async fn run_delete(engine: &Engine, path: &str, yes: bool, json: bool) -> Result<ExitCode> {
    if !yes && !confirm(&format!("Delete {path} permanently?"))? {
        println!("Aborted.");
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = engine.delete(path).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.message);
    }
    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
