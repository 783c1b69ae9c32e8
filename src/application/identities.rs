//! Identity Registry
//!
//! Provisions operator-managed identities and keeps their access-key
//! records. New identities are created on the provider's isolated
//! instance so the operator's own session stays in place.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use super::activity_log::ActivityLog;
use super::error::ConsoleError;
use super::guard::OperatorGuard;
use crate::domain::license::{format_timestamp, validate_credentials, validate_password};
use crate::domain::{LicenseRecord, ACCESS_KEY_COLLECTION, ACTION_PROVISION};
use crate::ports::{
    to_fields, CollectionQuery, Document, DocumentStore, Fields, ProviderError, SortDirection,
    WriteMode,
};

pub struct IdentityRegistry {
    store: Arc<dyn DocumentStore>,
    guard: OperatorGuard,
    activity: Arc<ActivityLog>,
}

impl IdentityRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, guard: OperatorGuard, activity: Arc<ActivityLog>) -> Self {
        Self {
            store,
            guard,
            activity,
        }
    }

    /// Provisioned identities, most recent first
    pub async fn list(&self) -> Result<Vec<LicenseRecord>, ConsoleError> {
        let query = CollectionQuery::new(ACCESS_KEY_COLLECTION)
            .order_by("provisionedAt", SortDirection::Descending);
        let docs = self.store.query(&query).await?;
        Ok(decode_records(&docs))
    }

    /// Create an identity and its access-key record
    pub async fn provision(&self, email: &str, password: &str) -> Result<LicenseRecord, ConsoleError> {
        self.guard.require()?;
        let email = email.trim();
        validate_credentials(email, password)?;

        let uid = self
            .guard
            .identity()
            .create_user_with_credentials(email, password)
            .await?;

        let record = LicenseRecord::provisioned(&uid, email, password, Utc::now());
        self.store
            .write_document(ACCESS_KEY_COLLECTION, &uid, to_fields(&record)?, WriteMode::Replace)
            .await?;
        tracing::info!("Provisioned {} ({})", email, uid);

        let detail = format!("Node Deployed: {}", email);
        if let Err(e) = self.activity.record(ACTION_PROVISION, &detail).await {
            tracing::warn!("Failed to log provisioning of {}: {}", email, e);
        }

        Ok(record)
    }

    /// Replace the stored password of a record
    pub async fn override_password(&self, id: &str, password: &str) -> Result<(), ConsoleError> {
        self.guard.require()?;
        validate_password(password)?;

        let fields = to_fields(&json!({
            "password": password,
            "lastPasswordUpdate": format_timestamp(Utc::now()),
        }))?;
        update_record(self.store.as_ref(), id, fields).await?;

        tracing::info!("Password override applied to {}", id);
        Ok(())
    }

    /// Delete a record. The provider identity itself is left in place.
    pub async fn purge(&self, id: &str) -> Result<(), ConsoleError> {
        self.guard.require()?;
        self.store.delete_document(ACCESS_KEY_COLLECTION, id).await?;
        tracing::info!("Purged identity record {}", id);
        Ok(())
    }
}

/// Decode access-key documents, skipping malformed ones
pub fn decode_records(docs: &[Document]) -> Vec<LicenseRecord> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<LicenseRecord>() {
            Ok(mut record) => {
                record.id = doc.id.clone();
                Some(record)
            }
            Err(e) => {
                tracing::warn!("Skipping malformed access-key record: {}", e);
                None
            }
        })
        .collect()
}

/// Merge `fields` into an existing access-key record; `NotFound` if absent
pub(crate) async fn update_record(
    store: &dyn DocumentStore,
    id: &str,
    fields: Fields,
) -> Result<(), ConsoleError> {
    match store
        .write_document(ACCESS_KEY_COLLECTION, id, fields, WriteMode::Update)
        .await
    {
        Err(ProviderError::NotFound(_)) => Err(ConsoleError::NotFound(id.to_string())),
        other => Ok(other?),
    }
}
