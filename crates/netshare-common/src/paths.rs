//! Standard filesystem paths for the driver.

use std::path::{Path, PathBuf};

use crate::name::VolumeName;

/// Default root directory for mounted shares.
pub const DEFAULT_ROOT: &str = "/var/lib/docker-volumes/netshare";

/// Name of the metadata directory below the root.
pub const META_DIR: &str = ".meta";

/// Standard paths used by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetsharePaths {
    /// Root directory (default: /var/lib/docker-volumes/netshare).
    pub root: PathBuf,
}

impl NetsharePaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata directory.
    #[must_use]
    pub fn meta(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    /// Metadata file for a volume.
    #[must_use]
    pub fn metadata_file(&self, name: &VolumeName) -> PathBuf {
        self.meta().join(name.to_relative_path())
    }

    /// Host directory a volume is mounted on.
    #[must_use]
    pub fn mountpoint(&self, name: &VolumeName) -> PathBuf {
        self.root.join(name.to_relative_path())
    }
}

impl Default for NetsharePaths {
    fn default() -> Self {
        Self::with_root(DEFAULT_ROOT)
    }
}
