//! Correlation markers threaded through connector operations for logging.

use std::fmt;

/// Opaque token that ties the log records of one logical operation together.
///
/// Carries no semantics beyond identity; it is rendered as a span field by
/// every cache and storage operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker(String);

impl Marker {
    /// Creates a fresh random marker.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Marker used for work the service performs on its own behalf, such as
    /// inserting bundled connectors at startup.
    pub fn system(task: &str) -> Self {
        Self(format!("system:{task}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for Marker {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Marker {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
