/// A measured file or directory and, for directories, its measured children.
///
/// Unlike a flat arena, a `SizedNode` tree is self-contained and cheap to
/// share behind an `Arc`: a completed scan is immutable and is handed out
/// to every caller waiting on it, and stored as-is in the scan cache.
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::classify::SkipReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

/// How a node's size was obtained.
///
/// Every entry the scanner sees ends up as a node; skipped and unreadable
/// entries are kept as zero-size placeholders so totals stay auditable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
    /// Measured exhaustively.
    Exact,
    /// Measured by the bounded estimator; `truncated` is set when the
    /// estimator ran out of depth or entry budget, i.e. the size is a lower
    /// bound.
    Estimated { truncated: bool },
    /// Not measured because the classifier skipped it.
    Skipped { reason: SkipReason },
    /// Could not be stat-ed or listed.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizedNode {
    pub name: CompactString,
    pub size_bytes: u64,
    pub kind: NodeKind,
    #[serde(flatten)]
    pub status: NodeStatus,
    /// Sorted by size, largest first. Always empty for files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SizedNode>,
}

impl SizedNode {
    pub fn file(name: impl Into<CompactString>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            kind: NodeKind::File,
            status: NodeStatus::Exact,
            children: Vec::new(),
        }
    }

    /// Build a directory whose size is the sum of `children`.
    ///
    /// Children are sorted descending by size here, with the name as a
    /// tie-breaker so two scans of the same tree compare equal.
    pub fn directory(name: impl Into<CompactString>, mut children: Vec<SizedNode>) -> Self {
        sort_by_size(&mut children);
        let size_bytes = children.iter().map(|c| c.size_bytes).sum();
        Self {
            name: name.into(),
            size_bytes,
            kind: NodeKind::Directory,
            status: NodeStatus::Exact,
            children,
        }
    }

    /// An estimate node: a directory whose contents were not walked exhaustively.
    pub fn estimated(name: impl Into<CompactString>, size_bytes: u64, truncated: bool) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            kind: NodeKind::Directory,
            status: NodeStatus::Estimated { truncated },
            children: Vec::new(),
        }
    }

    pub fn skipped(name: impl Into<CompactString>, kind: NodeKind, reason: SkipReason) -> Self {
        Self {
            name: name.into(),
            size_bytes: 0,
            kind,
            status: NodeStatus::Skipped { reason },
            children: Vec::new(),
        }
    }

    pub fn unreadable(name: impl Into<CompactString>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            size_bytes: 0,
            kind,
            status: NodeStatus::Unreadable,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    #[inline]
    pub fn is_estimate(&self) -> bool {
        matches!(self.status, NodeStatus::Estimated { .. })
    }

    /// `true` if this node or anything below it is an estimate.
    pub fn is_approximate(&self) -> bool {
        self.is_estimate() || self.children.iter().any(SizedNode::is_approximate)
    }

    /// `true` if the node contributed real bytes from a measurement.
    pub fn is_measured(&self) -> bool {
        matches!(
            self.status,
            NodeStatus::Exact | NodeStatus::Estimated { .. }
        )
    }

    /// Direct child by name.
    pub fn child(&self, name: &str) -> Option<&SizedNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SizedNode::node_count).sum::<usize>()
    }

    /// Check the directory sum invariant over the whole subtree.
    pub fn sums_are_consistent(&self) -> bool {
        if self.is_dir() && !self.children.is_empty() {
            let sum: u64 = self.children.iter().map(|c| c.size_bytes).sum();
            if sum != self.size_bytes {
                return false;
            }
        }
        self.children.iter().all(SizedNode::sums_are_consistent)
    }
}

/// Largest first; equal sizes ordered by name.
pub fn sort_by_size(nodes: &mut [SizedNode]) {
    nodes.sort_unstable_by(|a, b| {
        b.size_bytes
            .cmp(&a.size_bytes)
            .then_with(|| a.name.cmp(&b.name))
    });
}
