//! License Registry
//!
//! Rotates access tokens and expiry dates on access-key records.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

use super::error::ConsoleError;
use super::guard::OperatorGuard;
use super::identities::{decode_records, update_record};
use crate::domain::license::format_timestamp;
use crate::domain::{generate_access_key, LicenseError, LicenseRecord, ACCESS_KEY_COLLECTION};
use crate::ports::{to_fields, CollectionQuery, DocumentStore};

pub struct LicenseRegistry {
    store: Arc<dyn DocumentStore>,
    guard: OperatorGuard,
}

impl LicenseRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, guard: OperatorGuard) -> Self {
        Self { store, guard }
    }

    pub async fn list(&self) -> Result<Vec<LicenseRecord>, ConsoleError> {
        let docs = self
            .store
            .query(&CollectionQuery::new(ACCESS_KEY_COLLECTION))
            .await?;
        Ok(decode_records(&docs))
    }

    /// Fresh `QX-XXXX-XXXX-XXXX` token
    pub fn generate_key(&self) -> String {
        generate_access_key(&mut rand::thread_rng())
    }

    /// Set the access token and expiry of a record. Returns the stored token.
    pub async fn update(
        &self,
        id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ConsoleError> {
        self.guard.require()?;

        let token = token.trim().to_uppercase();
        if token.is_empty() {
            return Err(LicenseError::EmptyToken.into());
        }
        let fields = to_fields(&json!({
            "todayUserAccessKey": token,
            "endDate": format_timestamp(expires_at),
            "updatedAt": format_timestamp(Utc::now()),
        }))?;
        update_record(self.store.as_ref(), id, fields).await?;

        tracing::info!("License {} updated, expires {}", id, format_timestamp(expires_at));
        Ok(token)
    }

    pub async fn purge(&self, id: &str) -> Result<(), ConsoleError> {
        self.guard.require()?;
        self.store.delete_document(ACCESS_KEY_COLLECTION, id).await?;
        tracing::info!("Purged license {}", id);
        Ok(())
    }
}
