//! # netshare-common
//!
//! Shared utilities and types for the netshare volume driver.
//!
//! This crate provides:
//! - Volume name validation
//! - Option maps and the reserved option keys
//! - Standard filesystem paths
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod name;
pub mod options;
pub mod paths;

pub use error::{NetshareError, NetshareResult};
pub use name::VolumeName;
pub use options::{CREATE_OPT, SHARE_OPT, VolumeOptions};
pub use paths::NetsharePaths;
