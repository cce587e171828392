/// Platform-specific functionality — volume enumeration via the host's
/// disk-usage command.

pub mod volumes;

pub use volumes::{fallback_volumes, SystemVolumeSource, VolumeSource};
