//! Driver configuration.

use std::path::PathBuf;

use netshare_common::{NetshareError, NetsharePaths, NetshareResult};

/// Driver configuration options.
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Paths for mounts and metadata.
    pub paths: NetsharePaths,
}

impl DriverConfig {
    /// Set the root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = NetsharePaths::with_root(root);
        self
    }

    /// Check the configuration before opening a registry.
    ///
    /// # Errors
    ///
    /// Returns [`NetshareError::Config`] if the root is empty or relative.
    pub fn validate(&self) -> NetshareResult<()> {
        let root = self.paths.root();

        if root.as_os_str().is_empty() {
            return Err(NetshareError::Config {
                message: "root directory is empty".to_string(),
            });
        }
        if !root.is_absolute() {
            return Err(NetshareError::Config {
                message: format!("root directory must be absolute: {}", root.display()),
            });
        }

        Ok(())
    }
}
