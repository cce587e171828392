/// Path classifier — decides whether an entry is measured at all.
///
/// Rules, first match wins:
/// 1. reserved system locations from a static table (case-insensitive),
/// 2. paths the user excluded in [`Settings`],
/// 3. hidden entries, unless hidden files are shown,
/// 4. symlinks pointing back into the current ancestor chain.
///
/// Classification is pure: the scanner gathers any filesystem facts
/// (link targets, canonical ancestors) and passes them in.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::path;
use crate::settings::Settings;

/// Reserved names matched as whole path components anywhere in a path.
/// Entries may span components (`private/var/vm`).
const RESERVED_ANYWHERE: &[&str] = &[
    "$recycle.bin",
    "recycler",
    "system volume information",
    "pagefile.sys",
    "hiberfil.sys",
    "swapfile.sys",
    ".trashes",
    ".spotlight-v100",
    ".fseventsd",
    ".documentrevisions-v100",
    "private/var/vm",
];

/// Reserved trees anchored at the root of a Unix filesystem.
const RESERVED_ROOTS: &[&str] = &[
    "/proc",
    "/sys",
    "/dev",
    "/run",
    "/system/volumes",
    "/volumes",
    "/.vol",
];

/// Reserved folder names directly under a drive root (`C:/Windows`).
/// `program files` is a prefix so that `Program Files (x86)` matches too.
const RESERVED_DRIVE_FOLDERS: &[&str] = &["windows", "program files"];

#[cfg(windows)]
const HIDDEN_MARKERS: &[char] = &['.', '$'];
#[cfg(not(windows))]
const HIDDEN_MARKERS: &[char] = &['.'];

/// Why an entry was skipped. Carried on placeholder nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Reserved,
    Excluded,
    Hidden,
    SymlinkCycle,
}

/// Chain of directories from the scan root down to the entry being
/// classified. Lives on the recursion's stack frames, so it costs nothing
/// to extend and is safe to share across rayon workers.
#[derive(Debug, Clone, Copy)]
pub struct AncestorChain<'a> {
    dir: &'a Path,
    parent: Option<&'a AncestorChain<'a>>,
}

impl<'a> AncestorChain<'a> {
    pub fn root(dir: &'a Path) -> Self {
        Self { dir, parent: None }
    }

    pub fn child(&'a self, dir: &'a Path) -> AncestorChain<'a> {
        AncestorChain {
            dir,
            parent: Some(self),
        }
    }

    /// `true` if `target` is this directory or any of its ancestors.
    pub fn contains(&self, target: &Path) -> bool {
        let mut current = Some(self);
        while let Some(link) = current {
            if link.dir == target {
                return true;
            }
            current = link.parent;
        }
        false
    }
}

/// Facts about a single entry the scanner already collected.
#[derive(Debug, Clone, Default)]
pub struct EntryFacts {
    pub is_symlink: bool,
    /// Canonical target of a symlink, if it could be resolved.
    pub link_target: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct PathClassifier {
    show_hidden: bool,
    /// Normalised, lower-cased user exclusions.
    excluded: Vec<String>,
}

impl PathClassifier {
    pub fn new(settings: &Settings) -> Self {
        Self {
            show_hidden: settings.show_hidden,
            excluded: settings
                .excluded_paths
                .iter()
                .map(|p| path::normalize(p).to_lowercase())
                .collect(),
        }
    }

    /// Full classification of one entry.
    pub fn classify(
        &self,
        entry: &Path,
        facts: &EntryFacts,
        ancestors: &AncestorChain<'_>,
    ) -> Option<SkipReason> {
        if let Some(reason) = self.classify_path(entry) {
            return Some(reason);
        }
        Self::link_cycle(facts, ancestors)
    }

    /// The cycle guard on its own. Applies even when the rest of the
    /// classifier is switched off, since descent would never terminate.
    pub fn link_cycle(facts: &EntryFacts, ancestors: &AncestorChain<'_>) -> Option<SkipReason> {
        match &facts.link_target {
            Some(target) if facts.is_symlink && ancestors.contains(target) => {
                Some(SkipReason::SymlinkCycle)
            }
            _ => None,
        }
    }

    /// Rules that depend on the path string alone.
    pub fn classify_path(&self, entry: &Path) -> Option<SkipReason> {
        let key = path::normalize(&entry.to_string_lossy()).to_lowercase();
        if is_reserved_key(&key) {
            return Some(SkipReason::Reserved);
        }
        if self
            .excluded
            .iter()
            .any(|excluded| path::is_same_or_descendant(&key, excluded))
        {
            return Some(SkipReason::Excluded);
        }
        if !self.show_hidden && is_hidden_name(entry) {
            return Some(SkipReason::Hidden);
        }
        None
    }

    /// `should_skip` for callers without an ancestor chain.
    pub fn should_skip(&self, entry: &Path) -> bool {
        self.classify_path(entry).is_some()
    }

    /// Reserved or user-excluded, ignoring the hidden rule. Used by the
    /// estimator, which counts hidden bytes but never enters system trees.
    pub fn is_off_limits(&self, entry: &Path) -> bool {
        matches!(
            self.classify_path(entry),
            Some(SkipReason::Reserved | SkipReason::Excluded)
        )
    }
}

/// `true` if the path key names or lies inside a reserved system location.
pub fn is_reserved(key: &str) -> bool {
    is_reserved_key(&path::normalize(key).to_lowercase())
}

/// `true` if the lower-cased key touches a reserved location.
fn is_reserved_key(key: &str) -> bool {
    let framed = format!("/{}/", key.trim_end_matches('/'));
    if RESERVED_ANYWHERE
        .iter()
        .any(|marker| framed.contains(&format!("/{marker}/")))
    {
        return true;
    }
    if RESERVED_ROOTS
        .iter()
        .any(|root| path::is_same_or_descendant(key, root))
    {
        return true;
    }
    if let Some(rest) = drive_relative(key) {
        let first = rest.split('/').next().unwrap_or("");
        return RESERVED_DRIVE_FOLDERS
            .iter()
            .any(|folder| first.starts_with(folder));
    }
    false
}

/// Part of a key after an `x:/` drive root, if any.
fn drive_relative(key: &str) -> Option<&str> {
    let bytes = key.as_bytes();
    if bytes.len() > 3 && bytes[0].is_ascii_alphabetic() && &bytes[1..3] == b":/" {
        Some(&key[3..])
    } else {
        None
    }
}

fn is_hidden_name(entry: &Path) -> bool {
    entry
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(HIDDEN_MARKERS))
}
