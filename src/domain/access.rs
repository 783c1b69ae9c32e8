//! Access Policy
//!
//! Decides which principals may hold a session against the console.
//! The policy is a plain predicate so the single-address rule is one
//! implementation among others rather than part of the gate itself.

use std::fmt;

use super::principal::Principal;

/// The designated super-admin address
pub const SUPER_ADMIN_EMAIL: &str = "dokkustic@admin.com";

/// Message surfaced on the sign-in screen after a forced sign-out
pub const DENIAL_MESSAGE: &str = "UNAUTHORIZED: ONLY SUPER ADMIN CAN ACCESS THIS TERMINAL.";

/// Message returned when a mutation is attempted without authorization
pub const PERMISSION_REQUIRED_MESSAGE: &str = "ACCESS DENIED: SUPER ADMIN PERMISSION REQUIRED";

/// Outcome of evaluating the current authentication state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// No principal is signed in
    Unauthenticated,
    /// The signed-in principal satisfies the policy
    Authorized,
    /// The signed-in principal was rejected and is being signed out
    Denied,
}

impl AccessDecision {
    /// Derive a decision from an optional principal
    pub fn evaluate(principal: Option<&Principal>, policy: &dyn AccessPolicy) -> Self {
        match principal {
            None => AccessDecision::Unauthenticated,
            Some(p) if policy.is_authorized(p) => AccessDecision::Authorized,
            Some(_) => AccessDecision::Denied,
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, AccessDecision::Authorized)
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDecision::Unauthenticated => write!(f, "UNAUTHENTICATED"),
            AccessDecision::Authorized => write!(f, "AUTHORIZED"),
            AccessDecision::Denied => write!(f, "DENIED"),
        }
    }
}

/// Authorization predicate over principals
#[cfg_attr(test, mockall::automock)]
pub trait AccessPolicy: Send + Sync {
    fn is_authorized(&self, principal: &Principal) -> bool;
}

/// Admits exactly one email address, compared case-sensitively
#[derive(Debug, Clone)]
pub struct SuperAdminPolicy {
    email: String,
}

impl SuperAdminPolicy {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl Default for SuperAdminPolicy {
    fn default() -> Self {
        Self::new(SUPER_ADMIN_EMAIL)
    }
}

impl AccessPolicy for SuperAdminPolicy {
    fn is_authorized(&self, principal: &Principal) -> bool {
        principal.email == self.email
    }
}
