//! Firebase Auth Client
//!
//! Email/password sessions through the Identity Toolkit REST API. The
//! session (id token + refresh token) lives in this process; sign-out is
//! local. Accounts created through `accounts:signUp` never replace the
//! operator's session.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{read_json, FirebaseOptions};
use crate::domain::Principal;
use crate::ports::identity::{AuthStateBroadcaster, AuthStateReceiver, IdentityProvider};
use crate::ports::ProviderError;

/// Refresh the id token when it has less than this left
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Clone)]
struct Session {
    principal: Principal,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

pub struct FirebaseAuth {
    http: Client,
    options: FirebaseOptions,
    session: Mutex<Option<Session>>,
    broadcaster: AuthStateBroadcaster,
}

impl FirebaseAuth {
    pub fn new(http: Client, options: FirebaseOptions) -> Self {
        Self {
            http,
            options,
            session: Mutex::new(None),
            broadcaster: AuthStateBroadcaster::new(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{}", self.options.auth_base_url, method)
    }

    async fn call_accounts(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<AccountResponse, ProviderError> {
        let response = self
            .http
            .post(self.endpoint(method))
            .query(&[("key", self.options.api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let body = read_json(response).await?;
        serde_json::from_value(body)
            .map_err(|e| ProviderError::InvalidResponse(format!("accounts:{}: {}", method, e)))
    }

    /// Bearer token for the current session, refreshed when close to expiry
    pub async fn id_token(&self) -> Result<Option<String>, ProviderError> {
        let Some(session) = self.snapshot() else {
            return Ok(None);
        };

        if session.expires_at > Instant::now() + REFRESH_MARGIN {
            return Ok(Some(session.id_token));
        }

        tracing::debug!("Refreshing id token for {}", session.principal.email);
        let response = self
            .http
            .post(format!("{}/token", self.options.token_base_url))
            .query(&[("key", self.options.api_key.as_str())])
            .json(&json!({
                "grant_type": "refresh_token",
                "refresh_token": session.refresh_token,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let refreshed: RefreshResponse = serde_json::from_value(read_json(response).await?)
            .map_err(|e| ProviderError::InvalidResponse(format!("token refresh: {}", e)))?;

        let token = refreshed.id_token.clone();
        if let Ok(mut guard) = self.session.lock() {
            // Only update if the same principal is still signed in
            if let Some(current) = guard.as_mut() {
                if current.principal == session.principal {
                    current.id_token = refreshed.id_token;
                    current.refresh_token = refreshed.refresh_token;
                    current.expires_at = expiry_from(&refreshed.expires_in);
                }
            }
        }
        Ok(Some(token))
    }

    fn snapshot(&self) -> Option<Session> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    fn set_session(&self, session: Option<Session>) {
        let principal = session.as_ref().map(|s| s.principal.clone());
        if let Ok(mut guard) = self.session.lock() {
            *guard = session;
        }
        self.broadcaster.publish(principal);
    }
}

/// Instant at which a token issued now with `expires_in` seconds lapses
fn expiry_from(expires_in: &str) -> Instant {
    let secs = expires_in.parse::<u64>().unwrap_or(3600);
    Instant::now() + Duration::from_secs(secs)
}

fn map_sign_in_error(err: ProviderError) -> ProviderError {
    match err {
        ProviderError::Rejected { ref message, .. }
            if ["EMAIL_NOT_FOUND", "INVALID_PASSWORD", "INVALID_LOGIN_CREDENTIALS", "USER_DISABLED"]
                .iter()
                .any(|code| message.starts_with(code)) =>
        {
            ProviderError::InvalidCredentials
        }
        other => other,
    }
}

fn map_sign_up_error(err: ProviderError, email: &str) -> ProviderError {
    match err {
        ProviderError::Rejected { ref message, .. } if message.starts_with("EMAIL_EXISTS") => {
            ProviderError::AlreadyExists(email.to_string())
        }
        other => other,
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn watch_auth_state(&self) -> AuthStateReceiver {
        self.broadcaster.subscribe(Some(self.current_principal()))
    }

    fn current_principal(&self) -> Option<Principal> {
        self.snapshot().map(|s| s.principal)
    }

    async fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, ProviderError> {
        let account = self
            .call_accounts("signInWithPassword", email, password)
            .await
            .map_err(map_sign_in_error)?;

        let principal = Principal::new(account.local_id, account.email);
        tracing::info!("Signed in as {}", principal);

        self.set_session(Some(Session {
            principal: principal.clone(),
            id_token: account.id_token,
            refresh_token: account.refresh_token,
            expires_at: expiry_from(&account.expires_in),
        }));
        Ok(principal)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if let Some(principal) = self.current_principal() {
            tracing::info!("Signing out {}", principal);
        }
        self.set_session(None);
        Ok(())
    }

    async fn create_user_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, ProviderError> {
        let account = self
            .call_accounts("signUp", email, password)
            .await
            .map_err(|e| map_sign_up_error(e, email))?;

        tracing::info!("Created identity {} ({})", email, account.local_id);
        Ok(account.local_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(message: &str) -> ProviderError {
        ProviderError::Rejected {
            status: 400,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_sign_in_errors_become_invalid_credentials() {
        assert_eq!(map_sign_in_error(rejected("INVALID_PASSWORD")), ProviderError::InvalidCredentials);
        assert_eq!(
            map_sign_in_error(rejected("INVALID_LOGIN_CREDENTIALS")),
            ProviderError::InvalidCredentials
        );
        assert_eq!(
            map_sign_in_error(rejected("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled")),
            rejected("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled")
        );
    }

    #[test]
    fn test_sign_up_duplicate_email() {
        assert_eq!(
            map_sign_up_error(rejected("EMAIL_EXISTS"), "node@desk.io"),
            ProviderError::AlreadyExists("node@desk.io".to_string())
        );
        assert_eq!(
            map_sign_up_error(rejected("WEAK_PASSWORD : Password should be at least 6 characters"), "x@y.z"),
            rejected("WEAK_PASSWORD : Password should be at least 6 characters")
        );
    }

    #[test]
    fn test_account_response_shape() {
        let body = serde_json::json!({
            "kind": "identitytoolkit#VerifyPasswordResponse",
            "localId": "Zx81",
            "email": "dokkustic@admin.com",
            "idToken": "tok",
            "refreshToken": "ref",
            "expiresIn": "3600",
            "registered": true
        });
        let account: AccountResponse = serde_json::from_value(body).unwrap();
        assert_eq!(account.local_id, "Zx81");
        assert_eq!(account.expires_in, "3600");
    }

    #[tokio::test]
    async fn test_signed_out_client_has_no_token() {
        let auth = FirebaseAuth::new(Client::new(), FirebaseOptions::new("key", "p"));
        assert_eq!(auth.id_token().await.unwrap(), None);
        assert_eq!(auth.current_principal(), None);

        let mut rx = auth.watch_auth_state();
        assert_eq!(rx.recv().await, Some(None));

        auth.sign_out().await.unwrap();
        assert_eq!(rx.recv().await, Some(None));
    }
}
