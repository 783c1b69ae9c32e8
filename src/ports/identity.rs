//! Identity Provider Port
//!
//! Sign-in, sign-out, session notifications and isolated account creation.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::error::ProviderError;
use crate::domain::Principal;

/// Stream of authentication-state notifications. Dropping it unsubscribes.
pub type AuthStateReceiver = mpsc::UnboundedReceiver<Option<Principal>>;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to authentication-state changes.
    ///
    /// Each notification supersedes the previous one. Providers may deliver
    /// the current state immediately on subscription.
    fn watch_auth_state(&self) -> AuthStateReceiver;

    /// Principal of the current session, if any
    fn current_principal(&self) -> Option<Principal>;

    /// Start a session for the given credentials
    async fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, ProviderError>;

    /// End the current session
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Create a new identity on an isolated provider instance.
    ///
    /// Must not disturb the current session. Returns the new uid.
    async fn create_user_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, ProviderError>;
}

/// Fan-out of authentication-state notifications to live subscribers
#[derive(Debug, Default)]
pub struct AuthStateBroadcaster {
    senders: Mutex<Vec<mpsc::UnboundedSender<Option<Principal>>>>,
}

impl AuthStateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, optionally seeding it with the current state
    pub fn subscribe(&self, initial: Option<Option<Principal>>) -> AuthStateReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(state) = initial {
            let _ = tx.send(state);
        }
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }
        rx
    }

    /// Deliver a notification, pruning subscribers that went away
    pub fn publish(&self, state: Option<Principal>) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|tx| tx.send(state.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders
            .lock()
            .map(|mut senders| {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            })
            .unwrap_or(0)
    }
}
