//! # netshare
//!
//! Mount bookkeeping for a network-share volume driver.
//!
//! The plugin layer calls into a [`MountRegistry`] for every volume request.
//! The registry counts how many containers use each mount, tells managed
//! volumes (created with options) from unmanaged ones (seen on first use),
//! and mirrors managed volumes to a [`MetadataStore`] under `<root>/.meta`
//! so they come back after a restart.
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use netshare::{DriverConfig, MountRegistry};
//!
//! # fn example() -> netshare::NetshareResult<()> {
//! let config = DriverConfig::default().with_root("/var/lib/docker-volumes/netshare");
//! let registry = Arc::new(MountRegistry::open(&config)?);
//!
//! let opts = HashMap::from([("share".to_string(), "nas:/exports/data".to_string())]);
//! registry.create("data", opts)?;
//!
//! // A container mounts the volume.
//! registry.increment("data");
//!
//! // ...and releases it.
//! registry.decrement("data");
//! registry.delete("data")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod registry;
pub mod store;
pub mod volume;

pub use config::DriverConfig;
pub use netshare_common::{
    CREATE_OPT, NetshareError, NetshareResult, SHARE_OPT, VolumeName, VolumeOptions,
};
pub use registry::{MountRecord, MountRegistry};
pub use store::MetadataStore;
pub use volume::Volume;
