//! Local Identity Provider
//!
//! Email/password accounts kept in a JSON file, with salted SHA-256
//! digests instead of passwords. Sessions live only in this process.

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::domain::license::format_timestamp;
use crate::domain::Principal;
use crate::ports::identity::{AuthStateBroadcaster, AuthStateReceiver, IdentityProvider};
use crate::ports::ProviderError;

/// Length of generated uids
const UID_LEN: usize = 28;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    uid: String,
    email: String,
    password_sha256: String,
    created_at: String,
}

pub struct LocalIdentityProvider {
    path: Option<PathBuf>,
    accounts: Mutex<BTreeMap<String, Account>>,
    session: Mutex<Option<Principal>>,
    broadcaster: AuthStateBroadcaster,
}

impl LocalIdentityProvider {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            accounts: Mutex::new(BTreeMap::new()),
            session: Mutex::new(None),
            broadcaster: AuthStateBroadcaster::new(),
        }
    }

    /// Provider backed by the account file at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let path = path.into();
        let accounts = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| ProviderError::Storage(format!("read {}: {}", path.display(), e)))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    ProviderError::Storage(format!("corrupted {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            accounts: Mutex::new(accounts),
            session: Mutex::new(None),
            broadcaster: AuthStateBroadcaster::new(),
        })
    }

    /// Create an account and return its uid
    pub fn register(&self, email: &str, password: &str) -> Result<String, ProviderError> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| ProviderError::Storage("account lock poisoned".to_string()))?;

        if accounts.contains_key(email) {
            return Err(ProviderError::AlreadyExists(email.to_string()));
        }

        let uid = generate_uid();
        let mut next = accounts.clone();
        next.insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                email: email.to_string(),
                password_sha256: digest(&uid, password),
                created_at: format_timestamp(Utc::now()),
            },
        );
        self.persist(&next)?;
        *accounts = next;

        tracing::info!("Registered local identity {} ({})", email, uid);
        Ok(uid)
    }

    fn persist(&self, accounts: &BTreeMap<String, Account>) -> Result<(), ProviderError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ProviderError::Storage(format!("create {}: {}", parent.display(), e)))?;
        }
        let content = serde_json::to_string_pretty(accounts)
            .map_err(|e| ProviderError::Storage(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| ProviderError::Storage(format!("write {}: {}", path.display(), e)))
    }

    fn set_session(&self, principal: Option<Principal>) {
        if let Ok(mut session) = self.session.lock() {
            *session = principal.clone();
        }
        self.broadcaster.publish(principal);
    }
}

fn generate_uid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UID_LEN)
        .map(char::from)
        .collect()
}

fn digest(uid: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uid.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn watch_auth_state(&self) -> AuthStateReceiver {
        self.broadcaster.subscribe(Some(self.current_principal()))
    }

    fn current_principal(&self) -> Option<Principal> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    async fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, ProviderError> {
        let account = self
            .accounts
            .lock()
            .map_err(|_| ProviderError::Storage("account lock poisoned".to_string()))?
            .get(email)
            .cloned()
            .ok_or(ProviderError::InvalidCredentials)?;

        if digest(&account.uid, password) != account.password_sha256 {
            return Err(ProviderError::InvalidCredentials);
        }

        let principal = Principal::new(account.uid, account.email);
        self.set_session(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.set_session(None);
        Ok(())
    }

    async fn create_user_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, ProviderError> {
        self.register(email, password)
    }
}
