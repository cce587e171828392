/// Depth-limited, bottom-up directory measurement.
///
/// Each directory lists its children once, measures them in parallel on the
/// scanner's rayon pool and folds the results into a [`SizedNode`]. The
/// remaining depth budget shrinks by one per level; a child directory
/// reached with no budget left is measured by the [`Estimator`] and comes
/// back as an estimate node.
///
/// Per-entry failures never escape this module: an entry that cannot be
/// stat-ed or listed becomes an `Unreadable` placeholder of size 0 and its
/// siblings carry on.
use crate::classify::{AncestorChain, EntryFacts, PathClassifier};
use crate::error::EngineError;
use crate::model::{NodeKind, SizedNode};
use crate::scanner::estimate::Estimator;
use crate::scanner::progress::ScanCounters;
use crate::scanner::ScanOptions;
use compact_str::CompactString;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything one scan's recursion needs, borrowed for its duration.
pub(crate) struct WalkContext<'a> {
    pub classifier: &'a PathClassifier,
    pub options: &'a ScanOptions,
    pub estimator: &'a Estimator,
    pub counters: &'a ScanCounters,
}

/// A directory entry waiting to be measured.
pub(crate) struct PendingChild {
    pub path: PathBuf,
    pub name: CompactString,
}

/// List the immediate children of `dir`.
///
/// Fails only if the directory itself cannot be opened; entries that fail
/// mid-iteration are counted and dropped (they have no usable name).
pub(crate) fn list_children(dir: &Path, counters: &ScanCounters) -> io::Result<Vec<PendingChild>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        match entry {
            Ok(entry) => children.push(PendingChild {
                path: entry.path(),
                name: CompactString::new(entry.file_name().to_string_lossy()),
            }),
            Err(source) => {
                counters.error();
                let err = EngineError::EntryUnreadable {
                    path: dir.to_path_buf(),
                    source,
                };
                debug!("skipping entry: {err}");
            }
        }
    }
    Ok(children)
}

/// Identity used for the cycle guard: the canonical path when links are
/// followed, the path as walked otherwise.
pub(crate) fn chain_identity(dir: &Path, options: &ScanOptions) -> PathBuf {
    if options.follow_links {
        fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
    } else {
        dir.to_path_buf()
    }
}

/// Measure already-listed children of a directory in parallel and build the
/// directory node.
pub(crate) fn measure_children(
    ctx: &WalkContext<'_>,
    name: CompactString,
    children: Vec<PendingChild>,
    chain: &AncestorChain<'_>,
    budget: usize,
) -> SizedNode {
    let nodes: Vec<SizedNode> = children
        .into_par_iter()
        .map(|child| measure_entry(ctx, &child.path, child.name, chain, budget))
        .collect();
    ctx.counters.dir();
    SizedNode::directory(name, nodes)
}

/// Measure a directory: list it, then measure its children.
pub(crate) fn measure_dir(
    ctx: &WalkContext<'_>,
    dir: &Path,
    name: CompactString,
    ancestors: Option<&AncestorChain<'_>>,
    budget: usize,
) -> SizedNode {
    let children = match list_children(dir, ctx.counters) {
        Ok(children) => children,
        Err(source) => return unreadable(ctx, dir, source, name, NodeKind::Directory),
    };

    let identity = chain_identity(dir, ctx.options);
    match ancestors {
        Some(parent) => {
            let chain = parent.child(&identity);
            measure_children(ctx, name, children, &chain, budget)
        }
        None => {
            let chain = AncestorChain::root(&identity);
            measure_children(ctx, name, children, &chain, budget)
        }
    }
}

/// Measure a single entry below `ancestors`.
///
/// `budget` is the depth budget of the *parent*: a child directory is
/// estimated when it is zero, otherwise walked with `budget - 1`.
pub(crate) fn measure_entry(
    ctx: &WalkContext<'_>,
    path: &Path,
    name: CompactString,
    ancestors: &AncestorChain<'_>,
    budget: usize,
) -> SizedNode {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(source) => return unreadable(ctx, path, source, name, NodeKind::File),
    };

    let is_symlink = meta.file_type().is_symlink();
    let follow = is_symlink && ctx.options.follow_links;
    let facts = EntryFacts {
        is_symlink,
        link_target: if follow {
            fs::canonicalize(path).ok()
        } else {
            None
        },
    };

    // Resolve what the entry actually is once links are taken into account.
    let target_meta = if follow {
        match fs::metadata(path) {
            Ok(m) => m,
            // Dangling link.
            Err(source) => return unreadable(ctx, path, source, name, NodeKind::File),
        }
    } else {
        meta
    };
    let is_dir = target_meta.is_dir();
    let kind = if is_dir {
        NodeKind::Directory
    } else {
        NodeKind::File
    };

    let skip = if ctx.options.respect_classifier {
        ctx.classifier.classify(path, &facts, ancestors)
    } else {
        PathClassifier::link_cycle(&facts, ancestors)
    };
    if let Some(reason) = skip {
        ctx.counters.skipped();
        return SizedNode::skipped(name, kind, reason);
    }

    if !is_dir {
        ctx.counters.file();
        return SizedNode::file(name, target_meta.len());
    }

    if budget == 0 {
        return estimate_dir(ctx, path, name);
    }

    // Walk the link target itself so the cycle guard sees canonical paths.
    let walk_path = facts.link_target.as_deref().unwrap_or(path);
    measure_dir(ctx, walk_path, name, Some(ancestors), budget - 1)
}

/// Placeholder for an entry that could not be stat-ed or listed.
fn unreadable(
    ctx: &WalkContext<'_>,
    path: &Path,
    source: io::Error,
    name: CompactString,
    kind: NodeKind,
) -> SizedNode {
    ctx.counters.error();
    let err = EngineError::EntryUnreadable {
        path: path.to_path_buf(),
        source,
    };
    debug!("{err}");
    SizedNode::unreadable(name, kind)
}

/// Estimate node for a directory the exact walk does not enter.
pub(crate) fn estimate_dir(ctx: &WalkContext<'_>, dir: &Path, name: CompactString) -> SizedNode {
    let estimate = ctx.estimator.estimate(dir, ctx.classifier);
    ctx.counters.estimated();
    SizedNode::estimated(name, estimate.bytes, estimate.truncated)
}
