//! Volume descriptors handed to the plugin layer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::registry::MountRecord;

/// A volume as reported to the volume-plugin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Host directory the volume is mounted on.
    #[serde(rename = "Mountpoint")]
    pub mountpoint: PathBuf,
}

impl From<&MountRecord> for Volume {
    fn from(record: &MountRecord) -> Self {
        Self {
            name: record.name().to_string(),
            mountpoint: record.hostdir().to_path_buf(),
        }
    }
}
