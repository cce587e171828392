/// Error taxonomy for the engine.
///
/// Only a subset of these ever reaches a caller. `EntryUnreadable`,
/// `PlatformCommandFailed` and `CacheCorrupt` are recovered inside the
/// component that produces them; the rest are converted into a
/// serialisable [`Failure`] at the API boundary.
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Shared `Result` alias for the core crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot read scan root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read {path}: {source}")]
    EntryUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("resource busy: {path}")]
    ResourceBusy { path: PathBuf },

    #[error("not found: {path}")]
    NotFound { path: PathBuf },

    #[error("volume listing command `{command}` failed: {details}")]
    PlatformCommandFailed { command: String, details: String },

    #[error("cache data is corrupt: {details}")]
    CacheCorrupt { details: String },

    #[error("I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("background task failed: {details}")]
    TaskFailed { details: String },
}

/// Coarse class of a failure, for the transport shell to map onto its own
/// status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RootUnreadable,
    PermissionDenied,
    ResourceBusy,
    NotFound,
    Other,
}

impl ErrorCategory {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::RootUnreadable => "root unreadable",
            Self::PermissionDenied => "permission denied",
            Self::ResourceBusy => "resource busy",
            Self::NotFound => "not found",
            Self::Other => "error",
        }
    }
}

/// Structured failure returned by `analyze` — never a raw error string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub category: ErrorCategory,
    pub message: String,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category.label(), self.message)
    }
}

impl std::error::Error for Failure {}

impl EngineError {
    /// Convenience constructor for IO errors with a known path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify an `io::Error` raised while operating on `path`.
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match classify_io(&source) {
            ErrorCategory::PermissionDenied => Self::PermissionDenied { path },
            ErrorCategory::ResourceBusy => Self::ResourceBusy { path },
            ErrorCategory::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RootUnreadable { .. } => ErrorCategory::RootUnreadable,
            Self::PermissionDenied { .. } => ErrorCategory::PermissionDenied,
            Self::ResourceBusy { .. } => ErrorCategory::ResourceBusy,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::EntryUnreadable { source, .. } | Self::Io { source, .. } => classify_io(source),
            Self::PlatformCommandFailed { .. }
            | Self::CacheCorrupt { .. }
            | Self::Serialization { .. }
            | Self::TaskFailed { .. } => ErrorCategory::Other,
        }
    }

    /// Convert into the structured result handed across the API boundary.
    pub fn to_failure(&self) -> Failure {
        Failure {
            category: self.category(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<csv::Error> for EngineError {
    fn from(value: csv::Error) -> Self {
        Self::Serialization {
            context: "csv",
            details: value.to_string(),
        }
    }
}

/// Map an `io::Error` onto the failure classes callers care about.
///
/// `ResourceBusy` is also recognised from raw OS codes because older
/// platforms report sharing violations without a dedicated `ErrorKind`.
pub fn classify_io(err: &io::Error) -> ErrorCategory {
    match err.kind() {
        io::ErrorKind::PermissionDenied => return ErrorCategory::PermissionDenied,
        io::ErrorKind::NotFound => return ErrorCategory::NotFound,
        io::ErrorKind::ResourceBusy => return ErrorCategory::ResourceBusy,
        _ => {}
    }
    match err.raw_os_error() {
        // EBUSY / ETXTBSY
        #[cfg(unix)]
        Some(16) | Some(26) => ErrorCategory::ResourceBusy,
        // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
        #[cfg(windows)]
        Some(32) | Some(33) => ErrorCategory::ResourceBusy,
        _ => ErrorCategory::Other,
    }
}
