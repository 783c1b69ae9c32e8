//! Console
//!
//! Wires the identity provider, document store and access policy into the
//! gate and the services. Every service shares one `OperatorGuard`, so the
//! session context is injected rather than global.

use std::sync::Arc;
use std::time::Duration;

use super::access_gate::{AccessGate, GateHandle, GateState};
use super::activity_log::ActivityLog;
use super::error::ConsoleError;
use super::guard::OperatorGuard;
use super::identities::IdentityRegistry;
use super::licenses::LicenseRegistry;
use super::signal_queue::SignalQueueService;
use crate::domain::{AccessDecision, AccessPolicy, DENIAL_MESSAGE};
use crate::ports::{DocumentStore, IdentityProvider};

pub struct Console {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    policy: Arc<dyn AccessPolicy>,
    signals: SignalQueueService,
    identities: IdentityRegistry,
    licenses: LicenseRegistry,
    activity: Arc<ActivityLog>,
}

impl Console {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        let guard = OperatorGuard::new(identity.clone(), policy.clone());
        let activity = Arc::new(ActivityLog::new(store.clone(), guard.clone()));

        Self {
            signals: SignalQueueService::new(store.clone(), guard.clone()),
            identities: IdentityRegistry::new(store.clone(), guard.clone(), activity.clone()),
            licenses: LicenseRegistry::new(store.clone(), guard),
            activity,
            identity,
            store,
            policy,
        }
    }

    /// A gate bound to this console's provider and policy
    pub fn gate(&self) -> AccessGate {
        AccessGate::new(self.identity.clone(), self.policy.clone())
    }

    /// Sign in and wait (at most `wait`) for the gate's verdict.
    ///
    /// The running gate is returned so it keeps watching the session.
    pub async fn open_session(
        &self,
        email: &str,
        password: &str,
        wait: Duration,
    ) -> Result<(GateHandle, GateState), ConsoleError> {
        let gate = self.gate().spawn();
        let mut updates = gate.subscribe();

        self.identity.sign_in_with_credentials(email, password).await?;

        // Skip the signed-out state some providers report on subscription
        let decided = tokio::time::timeout(
            wait,
            updates.wait_for(|s| {
                !s.loading && (s.decision != AccessDecision::Unauthenticated || s.error.is_some())
            }),
        )
        .await;

        let state = match decided {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => gate.state(),
            Err(_) => return Err(ConsoleError::AuthTimeout(wait.as_secs())),
        };

        if !state.is_authorized() {
            let message = state.error.clone().unwrap_or_else(|| DENIAL_MESSAGE.to_string());
            return Err(ConsoleError::Unauthorized(message));
        }

        if let Some(principal) = &state.principal {
            tracing::info!("Console session open for {}", principal);
        }
        Ok((gate, state))
    }

    pub async fn close_session(&self, gate: GateHandle) -> Result<(), ConsoleError> {
        gate.shutdown().await;
        self.identity.sign_out().await?;
        Ok(())
    }

    pub fn signals(&self) -> &SignalQueueService {
        &self.signals
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn licenses(&self) -> &LicenseRegistry {
        &self.licenses
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}
