//! Common error types for the netshare driver.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`NetshareError`].
pub type NetshareResult<T> = Result<T, NetshareError>;

/// Errors raised by the mount registry and metadata store.
#[derive(Error, Diagnostic, Debug)]
pub enum NetshareError {
    /// Volume still has live consumers.
    #[error("Volume is currently in use: {name}")]
    #[diagnostic(
        code(netshare::volume::in_use),
        help("Unmount the volume from every container before removing it")
    )]
    InUse {
        /// The volume that is in use.
        name: String,
    },

    /// Invalid volume name.
    #[error("Invalid volume name '{name}': {reason}")]
    #[diagnostic(
        code(netshare::volume::invalid_name),
        help("Volume names are relative paths made of non-empty segments, without '.' or '..'")
    )]
    InvalidVolumeName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A metadata file could not be written.
    ///
    /// This is fatal: in-memory state and disk would disagree, and the next
    /// reload would resurrect the wrong mounts.
    #[error("Failed to persist volume metadata to {}: {source}", .path.display())]
    #[diagnostic(
        code(netshare::metadata::persist),
        help("Check free space and permissions of the metadata directory, then restart the driver")
    )]
    Persist {
        /// The metadata file being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(netshare::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(netshare::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(netshare::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl NetshareError {
    /// Whether the driver must stop after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Persist { .. })
    }
}

impl From<serde_json::Error> for NetshareError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
