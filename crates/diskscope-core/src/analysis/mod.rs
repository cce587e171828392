/// Analysis modules — post-scan algorithms over a finished size tree.

pub mod top_files;

pub use top_files::{largest_files, LargestFile};
