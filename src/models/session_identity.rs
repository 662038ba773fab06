use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-issued handle for the current connection.
///
/// Arrives in the `connected` event after the stream opens and lives until
/// the next disconnect. `generation` is the transport connect generation the
/// session belongs to; a session from an older generation is stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub id: String,
    pub generation: u64,
}

impl SessionIdentity {
    pub fn new(id: impl Into<String>, generation: u64) -> Self {
        Self {
            id: id.into(),
            generation,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (gen {})", self.id, self.generation)
    }
}
