//! Volume name validation.

use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NetshareError, NetshareResult};

/// Prefix reserved for in-flight metadata writes.
pub const RESERVED_PREFIX: &str = ".netshare-tmp-";

/// A validated volume name.
///
/// Volume names are relative paths separated by `/`:
/// - `share1`
/// - `tenantA/share1`
///
/// The last segment is the base name, the leading segments form an optional
/// sub-namespace. Every segment must be non-empty, must not be `.` or `..`
/// and must not start with [`RESERVED_PREFIX`], so a name can never escape
/// the directory it is joined onto.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeName(String);

impl VolumeName {
    /// Create a new volume name, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`NetshareError::InvalidVolumeName`] if the name is malformed.
    pub fn new(name: impl Into<String>) -> NetshareResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last segment of the name.
    #[must_use]
    pub fn base(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, base)| base)
    }

    /// The leading segments of the name, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(namespace, _)| namespace)
    }

    /// Iterate over the segments of the name.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The name as a relative path using the platform separator.
    #[must_use]
    pub fn to_relative_path(&self) -> PathBuf {
        self.segments().collect()
    }

    fn validate(name: &str) -> NetshareResult<()> {
        let reject = |reason| {
            Err(NetshareError::InvalidVolumeName {
                name: name.to_string(),
                reason,
            })
        };

        if name.is_empty() {
            return reject("name is empty");
        }
        if name.starts_with('/') {
            return reject("name must be relative");
        }
        if name.contains('\0') {
            return reject("name contains a NUL byte");
        }

        for segment in name.split('/') {
            match segment {
                "" => return reject("name contains an empty segment"),
                "." | ".." => return reject("name contains a '.' or '..' segment"),
                s if s.starts_with(RESERVED_PREFIX) => {
                    return reject("name uses a reserved prefix");
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VolumeName {
    type Err = NetshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VolumeName {
    type Error = NetshareError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VolumeName> for String {
    fn from(name: VolumeName) -> Self {
        name.0
    }
}

impl Borrow<str> for VolumeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VolumeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_names() {
        assert!(VolumeName::new("share1").is_ok());
        assert!(VolumeName::new("tenantA/share1").is_ok());
        assert!(VolumeName::new("a/b/c").is_ok());
        assert!(VolumeName::new(".hidden").is_ok());
        assert!(VolumeName::new("host:export").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(VolumeName::new("").is_err());
        assert!(VolumeName::new("/abs").is_err());
        assert!(VolumeName::new("..").is_err());
        assert!(VolumeName::new("a/../b").is_err());
        assert!(VolumeName::new("./a").is_err());
        assert!(VolumeName::new("a//b").is_err());
        assert!(VolumeName::new("a/").is_err());
        assert!(VolumeName::new(".netshare-tmp-abc").is_err());
        assert!(VolumeName::new("ns/.netshare-tmp-abc").is_err());
    }

    #[test]
    fn split_name() {
        let name = VolumeName::new("tenantA/share1").unwrap();
        assert_eq!(name.base(), "share1");
        assert_eq!(name.namespace(), Some("tenantA"));
        assert_eq!(name.to_relative_path(), PathBuf::from("tenantA/share1"));

        let name = VolumeName::new("share1").unwrap();
        assert_eq!(name.base(), "share1");
        assert_eq!(name.namespace(), None);
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<VolumeName, _> = serde_json::from_str("\"a/b\"");
        assert!(ok.is_ok());
        let bad: Result<VolumeName, _> = serde_json::from_str("\"../b\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn valid_names_stay_below_root(name in "[a-zA-Z0-9_.-]{1,8}(/[a-zA-Z0-9_.-]{1,8}){0,3}") {
            if let Ok(name) = VolumeName::new(name) {
                let path = name.to_relative_path();
                prop_assert!(path.is_relative());
                prop_assert!(path.components().all(|c| matches!(c, std::path::Component::Normal(_))));
            }
        }
    }
}
