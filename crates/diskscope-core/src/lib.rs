/// DiskScope Core — volume listing, directory sizing, caching and deletion.
///
/// This crate contains all engine logic with zero UI or transport
/// dependencies. A shell (the bundled CLI, an HTTP server, a GUI) drives it
/// through [`Engine`].
///
/// # Modules
///
/// - [`engine`] — The request API: `list_volumes`, `analyze`, `delete`,
///   with per-path scan coalescing and push events.
/// - [`scanner`] — Depth-limited parallel size scanning with bounded
///   estimation and a shallow strategy for volume roots.
/// - [`cache`] — Path-keyed result cache with pluggable durable storage.
/// - [`classify`] — Reserved, excluded, hidden and symlink-cycle rules.
/// - [`path`] — Path-key normalisation and helpers.
/// - [`platform`] — Volume enumeration through the host's disk-usage command.
/// - [`delete`] — File and tree removal reconciled with the cache.
/// - [`analysis`] — Post-scan queries such as the largest files.
/// - [`model`] — Size trees, volumes and size formatting.
pub mod analysis;
pub mod cache;
pub mod classify;
pub mod config;
pub mod delete;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod path;
pub mod platform;
pub mod scanner;
pub mod settings;

pub use config::EngineConfig;
pub use delete::DeleteOutcome;
pub use engine::{Analysis, Engine, EngineStats};
pub use error::{EngineError, ErrorCategory, Failure, Result};
pub use events::EngineEvent;
pub use model::{NodeKind, NodeStatus, SizedNode, VolumeInfo, VolumeListing};
pub use settings::{Settings, SettingsProvider, SharedSettings, StaticSettings};
