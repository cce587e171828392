/// Shallow strategy for scans rooted at a whole volume.
///
/// A full recursive walk of a system volume is too slow to serve
/// interactively, so only top-level entries are listed. Known-huge system
/// directories go straight to the estimator, everything else is measured
/// with a small depth cap. If nothing useful comes back (a locked-down
/// root, say) the well-known user-data folders are probed instead.
use crate::classify::AncestorChain;
use crate::model::{NodeKind, SizedNode};
use crate::scanner::walk::{self, PendingChild, WalkContext};
use compact_str::CompactString;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Top-level directories that are both huge and uninteresting to size
/// exactly. Compared case-insensitively against the entry name.
const HEAVY_SYSTEM_DIRS: &[&str] = &[
    "windows",
    "program files",
    "program files (x86)",
    "programdata",
    "usr",
    "lib",
    "opt",
    "snap",
    "nix",
    "system",
    "library",
    "applications",
];

fn is_heavy_system_dir(name: &str) -> bool {
    HEAVY_SYSTEM_DIRS
        .iter()
        .any(|heavy| name.eq_ignore_ascii_case(heavy))
}

/// Measure a volume root given its already-listed top-level entries.
/// `fallback_dirs` are probed when no entry yields any bytes.
pub(crate) fn scan_volume_root(
    ctx: &WalkContext<'_>,
    root: &Path,
    name: CompactString,
    entries: Vec<PendingChild>,
    depth_cap: usize,
    fallback_dirs: &[PathBuf],
) -> SizedNode {
    let identity = walk::chain_identity(root, ctx.options);
    let chain = AncestorChain::root(&identity);

    let nodes: Vec<SizedNode> = entries
        .into_par_iter()
        .map(|entry| {
            // Links such as a merged-usr `/lib` are measured as links, or
            // their target would be counted twice.
            let real_dir = fs::symlink_metadata(&entry.path).is_ok_and(|m| m.is_dir());
            if real_dir && is_heavy_system_dir(&entry.name) {
                let skip = ctx
                    .options
                    .respect_classifier
                    .then(|| ctx.classifier.classify_path(&entry.path))
                    .flatten();
                if let Some(reason) = skip {
                    ctx.counters.skipped();
                    return SizedNode::skipped(entry.name, NodeKind::Directory, reason);
                }
                debug!("estimating heavy system directory {}", entry.path.display());
                return walk::estimate_dir(ctx, &entry.path, entry.name);
            }
            walk::measure_entry(ctx, &entry.path, entry.name, &chain, depth_cap)
        })
        .collect();

    let usable = nodes.iter().any(|n| n.is_measured() && n.size_bytes > 0);
    if usable {
        ctx.counters.dir();
        return SizedNode::directory(name, nodes);
    }

    info!(
        "volume root {} yielded no usable entries; probing user folders",
        root.display()
    );
    let probes: Vec<SizedNode> = fallback_dirs
        .par_iter()
        .map(|dir| {
            let probe_name = CompactString::new(
                dir.file_name()
                    .map(|n| n.to_string_lossy())
                    .unwrap_or_else(|| dir.to_string_lossy()),
            );
            walk::measure_entry(ctx, dir, probe_name, &chain, depth_cap)
        })
        .collect();
    ctx.counters.dir();
    SizedNode::directory(name, probes)
}

/// Well-known per-user data folders that exist on this machine. Falls back
/// to the home directory itself when none of the specific folders exist.
pub(crate) fn user_data_dirs() -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = [
        dirs::document_dir(),
        dirs::download_dir(),
        dirs::desktop_dir(),
        dirs::picture_dir(),
        dirs::video_dir(),
        dirs::audio_dir(),
    ]
    .into_iter()
    .flatten()
    .filter(|p| p.is_dir())
    .collect();
    found.sort();
    found.dedup();

    if found.is_empty() {
        if let Some(home) = dirs::home_dir().filter(|h| h.is_dir()) {
            found.push(home);
        }
    }
    found
}
