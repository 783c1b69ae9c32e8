//! Principal
//!
//! The authenticated identity operating the console, as reported by the
//! identity provider. The console only ever reads it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Provider-assigned identity
    pub uid: String,
    /// Sign-in email, compared byte-for-byte by access policies
    pub email: String,
}

impl Principal {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.email, self.uid)
    }
}
