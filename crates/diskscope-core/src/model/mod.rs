/// Data model: sized trees, volumes and size formatting.
pub mod size;
pub mod sized_node;
pub mod volume;

pub use sized_node::{sort_by_size, NodeKind, NodeStatus, SizedNode};
pub use volume::{VolumeInfo, VolumeListing};
