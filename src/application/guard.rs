//! Operator Guard
//!
//! Re-checks authorization at the point of every write or delete, so a
//! mutation never relies on the caller having consulted the gate.

use std::sync::Arc;

use super::error::ConsoleError;
use crate::domain::{AccessPolicy, Principal};
use crate::ports::IdentityProvider;

#[derive(Clone)]
pub struct OperatorGuard {
    identity: Arc<dyn IdentityProvider>,
    policy: Arc<dyn AccessPolicy>,
}

impl OperatorGuard {
    pub fn new(identity: Arc<dyn IdentityProvider>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { identity, policy }
    }

    /// The current principal, if it satisfies the policy
    pub fn require(&self) -> Result<Principal, ConsoleError> {
        match self.identity.current_principal() {
            Some(principal) if self.policy.is_authorized(&principal) => Ok(principal),
            Some(principal) => {
                tracing::warn!("Rejected mutation by {}", principal);
                Err(ConsoleError::AccessDenied)
            }
            None => {
                tracing::warn!("Rejected mutation without a session");
                Err(ConsoleError::AccessDenied)
            }
        }
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }
}
