//! Access Gate
//!
//! Evaluates every authentication-state notification against the access
//! policy. A rejected principal is signed out in a background task and a
//! fixed denial message is surfaced; the gate never waits for that task.
//!
//! The gate is push-driven only: no retry, no polling, no timeout. Until
//! the first notification arrives the state stays `loading`.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{AccessDecision, AccessPolicy, Principal, DENIAL_MESSAGE};
use crate::ports::{IdentityProvider, ProviderError};

/// Observable gate state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateState {
    /// True until the first notification of any kind
    pub loading: bool,
    pub decision: AccessDecision,
    /// The notified principal (also set while it is being signed out)
    pub principal: Option<Principal>,
    /// Message for the sign-in screen
    pub error: Option<String>,
}

impl GateState {
    fn initial() -> Self {
        Self {
            loading: true,
            decision: AccessDecision::Unauthenticated,
            principal: None,
            error: None,
        }
    }

    pub fn is_authorized(&self) -> bool {
        !self.loading && self.decision.is_authorized()
    }
}

pub struct AccessGate {
    identity: Arc<dyn IdentityProvider>,
    policy: Arc<dyn AccessPolicy>,
    state: watch::Sender<GateState>,
}

impl AccessGate {
    pub fn new(identity: Arc<dyn IdentityProvider>, policy: Arc<dyn AccessPolicy>) -> Self {
        let (state, _) = watch::channel(GateState::initial());
        Self {
            identity,
            policy,
            state,
        }
    }

    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// Apply one notification.
    ///
    /// Returns the sign-out task when the principal was rejected.
    pub fn handle_notification(
        &self,
        principal: Option<Principal>,
    ) -> Option<JoinHandle<Result<(), ProviderError>>> {
        let decision = AccessDecision::evaluate(principal.as_ref(), self.policy.as_ref());

        let sign_out = match (&decision, &principal) {
            (AccessDecision::Denied, Some(rejected)) => {
                tracing::warn!("Access denied for {}, forcing sign-out", rejected);
                let identity = Arc::clone(&self.identity);
                Some(tokio::spawn(async move {
                    let result = identity.sign_out().await;
                    if let Err(e) = &result {
                        tracing::error!("Forced sign-out failed: {}", e);
                    }
                    result
                }))
            }
            (AccessDecision::Authorized, Some(admin)) => {
                tracing::info!("Access granted to {}", admin);
                None
            }
            _ => {
                tracing::debug!("No principal signed in");
                None
            }
        };

        self.state.send_modify(|state| {
            state.loading = false;
            state.decision = decision;
            state.principal = principal;
            match decision {
                AccessDecision::Authorized => state.error = None,
                AccessDecision::Denied => state.error = Some(DENIAL_MESSAGE.to_string()),
                // Keep a denial message so the sign-in screen can still show it
                AccessDecision::Unauthenticated => {}
            }
        });

        sign_out
    }

    /// Subscribe to the identity provider and evaluate notifications in a
    /// background task until the handle is dropped
    pub fn spawn(self) -> GateHandle {
        let mut notifications = self.identity.watch_auth_state();
        let state = self.subscribe();

        let task = tokio::spawn(async move {
            while let Some(principal) = notifications.recv().await {
                self.handle_notification(principal);
            }
            tracing::debug!("Authentication state stream closed");
        });

        GateHandle { state, task }
    }
}

/// Running gate. Dropping it unsubscribes from the identity provider.
#[derive(Debug)]
pub struct GateHandle {
    state: watch::Receiver<GateState>,
    task: JoinHandle<()>,
}

impl GateHandle {
    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.clone()
    }

    /// Wait until the first notification has been evaluated
    pub async fn ready(&mut self) -> GateState {
        let ready = self.state.wait_for(|s| !s.loading).await.map(|s| s.clone());
        ready.unwrap_or_else(|_| self.state.borrow().clone())
    }

    /// Stop evaluating notifications and wait for the task to wind down
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access::MockAccessPolicy;
    use crate::domain::SuperAdminPolicy;
    use crate::ports::mocks::MockIdentityProvider;

    fn admin() -> Principal {
        Principal::new("u-admin", "dokkustic@admin.com")
    }

    fn intruder() -> Principal {
        Principal::new("u-other", "trader@desk.io")
    }

    fn gate(identity: &Arc<MockIdentityProvider>) -> AccessGate {
        AccessGate::new(identity.clone(), Arc::new(SuperAdminPolicy::default()))
    }

    #[tokio::test]
    async fn test_loading_until_first_notification() {
        let identity = Arc::new(MockIdentityProvider::new());
        let gate = gate(&identity);
        assert!(gate.state().loading);

        gate.handle_notification(None);
        let state = gate.state();
        assert!(!state.loading);
        assert_eq!(state.decision, AccessDecision::Unauthenticated);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_non_admin_signed_out_once_and_denied() {
        let identity = Arc::new(MockIdentityProvider::new());
        let gate = gate(&identity);

        let sign_out = gate.handle_notification(Some(intruder()));
        let state = gate.state();
        assert_eq!(state.decision, AccessDecision::Denied);
        assert_eq!(state.error.as_deref(), Some(DENIAL_MESSAGE));

        sign_out.expect("sign-out task").await.unwrap().unwrap();
        assert_eq!(identity.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn test_admin_authorized_and_error_cleared() {
        let identity = Arc::new(MockIdentityProvider::new());
        let gate = gate(&identity);

        gate.handle_notification(Some(intruder()));
        let sign_out = gate.handle_notification(Some(admin()));

        assert!(sign_out.is_none());
        let state = gate.state();
        assert!(state.is_authorized());
        assert_eq!(state.error, None);
        assert_eq!(state.principal, Some(admin()));
    }

    #[tokio::test]
    async fn test_email_match_is_case_sensitive() {
        let identity = Arc::new(MockIdentityProvider::new());
        let gate = gate(&identity);

        let sign_out = gate.handle_notification(Some(Principal::new("u", "DOKKUSTIC@admin.com")));
        assert_eq!(gate.state().decision, AccessDecision::Denied);
        sign_out.unwrap().await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_denial_message_survives_sign_out_notification() {
        let identity = Arc::new(MockIdentityProvider::new());
        let gate = gate(&identity);

        gate.handle_notification(Some(intruder()));
        gate.handle_notification(None);

        let state = gate.state();
        assert_eq!(state.decision, AccessDecision::Unauthenticated);
        assert_eq!(state.error.as_deref(), Some(DENIAL_MESSAGE));
    }

    #[tokio::test]
    async fn test_failed_sign_out_still_denies() {
        let identity = Arc::new(MockIdentityProvider::new().failing_sign_out());
        let gate = gate(&identity);

        let sign_out = gate.handle_notification(Some(intruder()));
        assert_eq!(gate.state().decision, AccessDecision::Denied);
        assert!(sign_out.unwrap().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let mut policy = MockAccessPolicy::new();
        policy.expect_is_authorized().returning(|p| p.uid == "u-other");

        let identity = Arc::new(MockIdentityProvider::new());
        let gate = AccessGate::new(identity.clone(), Arc::new(policy));

        assert!(gate.handle_notification(Some(intruder())).is_none());
        assert!(gate.state().is_authorized());
    }

    #[tokio::test]
    async fn test_spawned_gate_follows_provider() {
        let identity = Arc::new(MockIdentityProvider::new());
        let mut handle = gate(&identity).spawn();
        let mut rx = handle.subscribe();
        assert!(handle.state().loading);

        identity.emit(Some(admin()));
        let state = handle.ready().await;
        assert!(state.is_authorized());

        identity.emit(Some(intruder()));
        // Denied, then the forced sign-out notifies the gate again
        rx.wait_for(|s| s.decision == AccessDecision::Unauthenticated && s.error.is_some())
            .await
            .unwrap();

        assert_eq!(identity.sign_out_calls(), 1);
        assert_eq!(handle.state().error.as_deref(), Some(DENIAL_MESSAGE));
    }

    #[tokio::test]
    async fn test_shutdown_unsubscribes() {
        let identity = Arc::new(MockIdentityProvider::new());
        let handle = gate(&identity).spawn();
        assert_eq!(identity.subscriber_count(), 1);

        handle.shutdown().await;
        assert_eq!(identity.subscriber_count(), 0);
    }
}
