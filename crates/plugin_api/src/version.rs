//! Host version information and the plugin compatibility gate.

use crate::PluginDetails;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The version of the plugin host that this crate describes.
///
/// Plugins declare the `major.minor` pair they were built against in their
/// [`PluginDetails`]; the loader compares that pair with this value.
pub const HOST_VERSION: VersionInfo = VersionInfo::new(3, 0, 0);

/// A `major.minor.revision` version triple describing the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

impl VersionInfo {
    pub const fn new(major: u32, minor: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// Checks whether a plugin built against `details.required_major` and
    /// `details.required_minor` may be loaded by this host.
    ///
    /// A plugin is only rejected when *both* the major and the minor number
    /// differ from the host's. A plugin that matches either one of them is
    /// accepted, even across a major version bump.
    pub fn is_compatible(&self, details: &PluginDetails) -> bool {
        !(details.required_major != self.major && details.required_minor != self.minor)
    }
}

impl Default for VersionInfo {
    fn default() -> Self {
        HOST_VERSION
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requiring(major: u32, minor: u32) -> PluginDetails {
        PluginDetails::new("versioned", "Versioned").requires(major, minor)
    }

    #[test]
    fn test_host_version_string() {
        assert_eq!(HOST_VERSION.to_string(), "3.0.0");
        assert_eq!(VersionInfo::default(), HOST_VERSION);
    }

    #[test]
    fn test_exact_match_is_compatible() {
        let host = VersionInfo::new(3, 2, 7);
        assert!(host.is_compatible(&requiring(3, 2)));
    }

    // Only a simultaneous major and minor mismatch is rejected. These cases
    // lock that behaviour in until the gate is deliberately revised.
    #[test]
    fn test_single_field_mismatch_is_accepted() {
        let host = VersionInfo::new(3, 2, 0);
        assert!(host.is_compatible(&requiring(3, 1)));
        assert!(host.is_compatible(&requiring(2, 2)));
        assert!(host.is_compatible(&requiring(4, 2)));
    }

    #[test]
    fn test_both_fields_mismatch_is_rejected() {
        let host = VersionInfo::new(3, 2, 0);
        assert!(!host.is_compatible(&requiring(2, 1)));
        assert!(!host.is_compatible(&requiring(4, 0)));
    }

    #[test]
    fn test_revision_is_ignored() {
        let a = VersionInfo::new(3, 0, 0);
        let b = VersionInfo::new(3, 0, 99);
        let details = requiring(3, 0);
        assert_eq!(a.is_compatible(&details), b.is_compatible(&details));
    }
}
