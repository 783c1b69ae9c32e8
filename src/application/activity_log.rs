//! Activity Log
//!
//! Append-only record of operator actions, read back newest first.

use chrono::Utc;
use std::sync::Arc;

use super::error::ConsoleError;
use super::guard::OperatorGuard;
use crate::domain::{ActivityLogEntry, ACTIVITY_COLLECTION};
use crate::ports::{to_fields, CollectionQuery, Document, DocumentStore, SortDirection};

pub struct ActivityLog {
    store: Arc<dyn DocumentStore>,
    guard: OperatorGuard,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn DocumentStore>, guard: OperatorGuard) -> Self {
        Self { store, guard }
    }

    fn recent_query(limit: usize) -> CollectionQuery {
        CollectionQuery::new(ACTIVITY_COLLECTION)
            .order_by("timestamp", SortDirection::Descending)
            .limit(limit)
    }

    /// Append an entry attributed to the current operator
    pub async fn record(&self, action: &str, detail: &str) -> Result<String, ConsoleError> {
        let operator = self.guard.require()?;
        let entry = ActivityLogEntry::new(action, detail, Some(operator.email), Utc::now());

        let id = self
            .store
            .add_document(ACTIVITY_COLLECTION, to_fields(&entry)?)
            .await?;
        tracing::debug!("Logged {} ({})", action, id);
        Ok(id)
    }

    /// The latest `limit` entries, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, ConsoleError> {
        let docs = self.store.query(&Self::recent_query(limit)).await?;
        Ok(decode_entries(&docs))
    }
}

/// Decode log documents, skipping malformed ones
pub fn decode_entries(docs: &[Document]) -> Vec<ActivityLogEntry> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<ActivityLogEntry>() {
            Ok(mut entry) => {
                entry.id = doc.id.clone();
                Some(entry)
            }
            Err(e) => {
                tracing::warn!("Skipping malformed log entry: {}", e);
                None
            }
        })
        .collect()
}
