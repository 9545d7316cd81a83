//! Schema version value type and compatibility rule.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `(major, minor, patch)` schema version.
///
/// Two versions are *equal* when all three components match, and *compatible*
/// when only `major` matches — see [`SchemaVersion::is_compatible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    /// The schema version this build of the core advertises to a server.
    pub const CURRENT: SchemaVersion = SchemaVersion::new(1, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Two versions are compatible when they share the same major component.
    pub fn is_compatible(&self, other: &SchemaVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
