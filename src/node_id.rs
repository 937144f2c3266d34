//! Stable per-process identifier embedded in every write, used to suppress
//! change-feed self-echo.

use std::fmt;

/// A stable, unique identifier generated once at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(uuid::Uuid);

impl NodeId {
    /// Generate a fresh NodeId. Call once per process and share it.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse from the source-id string recorded on a wrapper. An empty or
    /// unparseable string is treated as "unknown origin" — never equal to any
    /// real NodeId, so the event is never suppressed as self-echo.
    pub fn from_source_id(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
