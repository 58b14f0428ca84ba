//! Volume option maps and helpers.
//!
//! Options are an opaque string map; upper layers recognize a couple of
//! reserved keys by convention.

use std::collections::HashMap;

/// Option name to option value.
pub type VolumeOptions = HashMap<String, String>;

/// Remote share the volume is backed by.
pub const SHARE_OPT: &str = "share";

/// Whether the remote share should be created when missing.
pub const CREATE_OPT: &str = "create";

/// Interpret an option value as a boolean.
///
/// Only `yes` and `true` (any case) are truthy. Everything else, `1`
/// included, is false.
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "yes" || value == "true"
}
