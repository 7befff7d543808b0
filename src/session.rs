//! Session identity shared by every remote call of one controller

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque token correlating all remote calls for one conversation.
///
/// Generated once when a controller is constructed and passed around by value.
/// It cannot be regenerated in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh, never-before-used session identity
    pub fn generate() -> Self {
        Self(format!("session_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Room name for the real-time transport of this session
    pub fn room_name(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.0.clone()
        } else {
            format!("{}-{}", prefix, self.0)
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
