/// Human-readable byte counts for CLI and log output.
///
/// All sizes are `u64` bytes internally; floating point only appears here.
use super::sized_node::{NodeStatus, SizedNode};

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;
const TB: f64 = GB * 1024.0;

/// Format a byte count with binary units labelled KB/MB/GB/TB.
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else if b < TB {
        format!("{:.2} GB", b / GB)
    } else {
        format!("{:.2} TB", b / TB)
    }
}

/// Format a node's size so estimates can't be mistaken for measurements:
/// `~` marks an estimate, a trailing `+` a truncated (lower-bound) estimate,
/// and placeholders show a dash.
pub fn format_node_size(node: &SizedNode) -> String {
    match node.status {
        NodeStatus::Exact => format_size(node.size_bytes),
        NodeStatus::Estimated { truncated: false } => format!("~{}", format_size(node.size_bytes)),
        NodeStatus::Estimated { truncated: true } => {
            format!("~{}+", format_size(node.size_bytes))
        }
        NodeStatus::Skipped { .. } | NodeStatus::Unreadable => "-".to_string(),
    }
}
