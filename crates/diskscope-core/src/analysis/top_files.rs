/// Top-N largest files analysis.
///
/// Walks a finished [`SizedNode`] tree and keeps the N largest exact file
/// nodes in a bounded min-heap, so memory stays O(N) for any tree size.
/// Estimates and placeholders are never reported: they are not files.
use crate::model::{NodeKind, NodeStatus, SizedNode};
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A single entry in the "largest files" results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LargestFile {
    /// Path key, built from `root_key` and the node names below it.
    pub path: String,
    pub size_bytes: u64,
}

impl Ord for LargestFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size_bytes
            .cmp(&other.size_bytes)
            .then_with(|| other.path.cmp(&self.path))
    }
}

impl PartialOrd for LargestFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `n` largest files under `tree`, largest first (ties by path).
/// `root_key` is the path key the tree was scanned from.
pub fn largest_files(tree: &SizedNode, root_key: &str, n: usize) -> Vec<LargestFile> {
    if n == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<LargestFile>> = BinaryHeap::with_capacity(n + 1);
    let base = root_key.trim_end_matches('/');

    // Iterative DFS; trees can be deep enough to make recursion risky.
    let mut stack: Vec<(String, &SizedNode)> = tree
        .children
        .iter()
        .map(|child| (format!("{base}/{}", child.name), child))
        .collect();
    if tree.kind == NodeKind::File {
        stack.push((root_key.to_string(), tree));
    }

    while let Some((path, node)) = stack.pop() {
        match node.kind {
            NodeKind::File if node.status == NodeStatus::Exact => {
                let candidate = LargestFile {
                    path,
                    size_bytes: node.size_bytes,
                };
                if heap.len() < n {
                    heap.push(Reverse(candidate));
                } else if heap.peek().is_some_and(|Reverse(min)| candidate > *min) {
                    heap.pop();
                    heap.push(Reverse(candidate));
                }
            }
            NodeKind::File => {}
            NodeKind::Directory => {
                stack.extend(
                    node.children
                        .iter()
                        .map(|child| (format!("{path}/{}", child.name), child)),
                );
            }
        }
    }

    let mut result: Vec<LargestFile> = heap.into_iter().map(|Reverse(f)| f).collect();
    result.sort_by(|a, b| b.cmp(a));
    result
}
