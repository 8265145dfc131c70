//! Authenticated caller identity

use serde::{Deserialize, Serialize};

/// The identity attached to a call by the authentication interceptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier (subject)
    pub id: String,
    /// Human-readable name
    pub name: String,
}

impl Principal {
    /// Create a new principal
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The identity used when authentication is disabled
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("anonymous", "anonymous")
    }
}
