//! Signal Queue Service
//!
//! Bulk injection and flushing of the daily trading-signal queue. A batch
//! is validated in full before anything is written, then committed as a
//! full replace of the single queue document so the stored order mirrors
//! the submission exactly.

use chrono::Utc;
use std::sync::Arc;

use super::error::ConsoleError;
use super::guard::OperatorGuard;
use crate::domain::{parse_signal_batch, SignalQueueDocument, SIGNAL_COLLECTION};
use crate::ports::{
    to_fields, CollectionQuery, CollectionReceiver, Document, DocumentStore, WriteMode,
};

/// Status line after a committed batch
pub const BROADCAST_SUCCESS_MESSAGE: &str = "BROADCAST SUCCESSFUL: SERIAL ORDER COMMITTED";

/// Status line after a flush
pub const QUEUE_FLUSHED_MESSAGE: &str = "QUEUE FLUSHED";

/// The stored queue together with its document identity
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub id: String,
    pub document: SignalQueueDocument,
}

impl QueueSnapshot {
    fn from_document(doc: &Document) -> Result<Self, ConsoleError> {
        Ok(Self {
            id: doc.id.clone(),
            document: doc.decode()?,
        })
    }
}

/// Result of a committed batch
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReceipt {
    pub document_id: String,
    pub signals: usize,
    /// True when an existing queue document was overwritten
    pub replaced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed(String),
    NothingToFlush,
}

pub struct SignalQueueService {
    store: Arc<dyn DocumentStore>,
    guard: OperatorGuard,
}

impl SignalQueueService {
    pub fn new(store: Arc<dyn DocumentStore>, guard: OperatorGuard) -> Self {
        Self { store, guard }
    }

    fn queue_query() -> CollectionQuery {
        CollectionQuery::new(SIGNAL_COLLECTION).limit(1)
    }

    /// Live view of the queue collection
    pub fn watch(&self) -> CollectionReceiver {
        self.store.watch_collection(Self::queue_query())
    }

    /// Decode one emission of [`watch`](Self::watch)
    pub fn snapshot_of(docs: &[Document]) -> Result<Option<QueueSnapshot>, ConsoleError> {
        docs.first().map(QueueSnapshot::from_document).transpose()
    }

    /// The stored queue, if any
    pub async fn current(&self) -> Result<Option<QueueSnapshot>, ConsoleError> {
        let docs = self.store.query(&Self::queue_query()).await?;
        Self::snapshot_of(&docs)
    }

    /// Validate `raw` and replace the queue with it.
    ///
    /// Nothing is written unless the whole batch is valid.
    pub async fn ingest(&self, raw: &str) -> Result<IngestReceipt, ConsoleError> {
        self.guard.require()?;
        let signals = parse_signal_batch(raw)?;

        let existing = self.store.query(&Self::queue_query()).await?;
        let now = Utc::now();
        let (document_id, replaced) = match existing.first() {
            Some(doc) => (doc.id.clone(), true),
            None => (SignalQueueDocument::fresh_id(now), false),
        };

        let document = SignalQueueDocument::new(signals, now);
        let fields = to_fields(&document)?;
        self.store
            .write_document(SIGNAL_COLLECTION, &document_id, fields, WriteMode::Replace)
            .await?;

        tracing::info!(
            "Committed {} signals to {}/{}",
            document.len(),
            SIGNAL_COLLECTION,
            document_id
        );

        Ok(IngestReceipt {
            document_id,
            signals: document.len(),
            replaced,
        })
    }

    /// Delete the queue document. A missing queue is not an error.
    pub async fn flush(&self) -> Result<FlushOutcome, ConsoleError> {
        self.guard.require()?;

        let existing = self.store.query(&Self::queue_query()).await?;
        let Some(doc) = existing.first() else {
            tracing::info!("Queue already empty, nothing to flush");
            return Ok(FlushOutcome::NothingToFlush);
        };

        self.store.delete_document(SIGNAL_COLLECTION, &doc.id).await?;
        tracing::info!("Flushed queue document {}", doc.id);
        Ok(FlushOutcome::Flushed(doc.id.clone()))
    }
}

/// Operator input awaiting injection.
///
/// The text survives a failed submission so it can be corrected; a
/// successful one clears it.
#[derive(Debug, Clone, Default)]
pub struct IngestDraft {
    text: String,
    status: Option<String>,
}

impl IngestDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Last status line, success or failure
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub async fn submit(&mut self, service: &SignalQueueService) -> Result<IngestReceipt, ConsoleError> {
        match service.ingest(&self.text).await {
            Ok(receipt) => {
                self.text.clear();
                self.status = Some(BROADCAST_SUCCESS_MESSAGE.to_string());
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!("Injection rejected: {}", e);
                self.status = Some(format!("INJECTION FAILED: {}", e));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IngestError, Principal, SuperAdminPolicy, TradeSignal};
    use crate::ports::mocks::{MockDocumentStore, MockIdentityProvider, StoreCall};
    use serde_json::json;

    fn service_with(store: &Arc<MockDocumentStore>, principal: Principal) -> SignalQueueService {
        let identity = Arc::new(MockIdentityProvider::new().with_session(principal));
        let guard = OperatorGuard::new(identity, Arc::new(SuperAdminPolicy::default()));
        SignalQueueService::new(store.clone(), guard)
    }

    fn admin_service(store: &Arc<MockDocumentStore>) -> SignalQueueService {
        service_with(store, Principal::new("u-admin", "dokkustic@admin.com"))
    }

    #[tokio::test]
    async fn test_concrete_batch_committed_in_order() {
        let store = Arc::new(MockDocumentStore::new());
        let service = admin_service(&store);

        let raw = r#"[{"pair":"eurusd","time":"16:11","type":"put"},{"pair":"eurusd","time":"16:22","type":"call"}]"#;
        let receipt = service.ingest(raw).await.unwrap();

        assert_eq!(receipt.signals, 2);
        assert!(!receipt.replaced);
        assert!(receipt.document_id.starts_with("DOC_"));

        let queue = service.current().await.unwrap().unwrap();
        assert_eq!(
            queue.document.trading_queue,
            vec![
                TradeSignal::new("EURUSD", "16:11", "PUT"),
                TradeSignal::new("EURUSD", "16:22", "CALL"),
            ]
        );
        assert_eq!(queue.document.version, "7.2");
    }

    #[tokio::test]
    async fn test_time_case_preserved() {
        let store = Arc::new(MockDocumentStore::new());
        let service = admin_service(&store);

        service
            .ingest(r#"[{"pair":"gbpjpy","time":"9:05pm","type":"Call"}]"#)
            .await
            .unwrap();

        let queue = service.current().await.unwrap().unwrap();
        assert_eq!(queue.document.trading_queue[0], TradeSignal::new("GBPJPY", "9:05pm", "CALL"));
    }

    #[tokio::test]
    async fn test_writes_use_full_replace() {
        let store = Arc::new(MockDocumentStore::new());
        let service = admin_service(&store);
        service.ingest(r#"[{"pair":"a","time":"1","type":"b"}]"#).await.unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            &calls[0],
            StoreCall::Write { collection, mode: WriteMode::Replace, .. } if collection == SIGNAL_COLLECTION
        ));
    }

    #[tokio::test]
    async fn test_existing_document_identity_reused() {
        let store = Arc::new(MockDocumentStore::new().with_document(
            SIGNAL_COLLECTION,
            "DOC_1700000000000",
            json!({"signalDate": "2026-10-17", "tradingQueue": [], "lastUpdated": "x", "version": "7.2", "stale": true}),
        ));
        let service = admin_service(&store);

        let receipt = service
            .ingest(r#"[{"pair":"usdjpy","time":"10:00","type":"call"}]"#)
            .await
            .unwrap();

        assert_eq!(receipt.document_id, "DOC_1700000000000");
        assert!(receipt.replaced);
        assert_eq!(store.documents(SIGNAL_COLLECTION).len(), 1);

        let stored = store.document(SIGNAL_COLLECTION, "DOC_1700000000000").unwrap();
        assert!(!stored.contains_key("stale"));
    }

    #[tokio::test]
    async fn test_same_batch_twice_is_identical() {
        let store = Arc::new(MockDocumentStore::new());
        let service = admin_service(&store);
        let raw = r#"[{"pair":"x","time":"1","type":"put"},{"pair":"y","time":"2","type":"call"}]"#;

        service.ingest(raw).await.unwrap();
        let first = service.current().await.unwrap().unwrap();
        service.ingest(raw).await.unwrap();
        let second = service.current().await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.document.trading_queue, second.document.trading_queue);
    }

    #[tokio::test]
    async fn test_invalid_json_writes_nothing() {
        let store = Arc::new(MockDocumentStore::new().with_document(
            SIGNAL_COLLECTION,
            "DOC_1",
            json!({"tradingQueue": [{"pair": "EURUSD", "time": "1", "type": "PUT"}]}),
        ));
        let service = admin_service(&store);

        let err = service.ingest("not json").await.unwrap_err();
        assert!(matches!(err, ConsoleError::Ingest(IngestError::Parse(_))));
        assert_eq!(store.write_count(), 0);

        let queue = service.current().await.unwrap().unwrap();
        assert_eq!(queue.document.trading_queue.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_field_reports_index() {
        let store = Arc::new(MockDocumentStore::new());
        let service = admin_service(&store);

        let err = service
            .ingest(r#"[{"pair":"GBPUSD","time":"09:00"}]"#)
            .await
            .unwrap_err();
        assert_eq!(err, ConsoleError::Ingest(IngestError::Field { index: 0 }));

        let err = service
            .ingest(r#"[{"pair":"a","time":"1","type":"b"},{"pair":"a","time":"","type":"b"}]"#)
            .await
            .unwrap_err();
        assert_eq!(err, ConsoleError::Ingest(IngestError::Field { index: 1 }));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_ingest_rejected() {
        let store = Arc::new(MockDocumentStore::new());
        let service = service_with(&store, Principal::new("u2", "trader@desk.io"));

        let err = service
            .ingest(r#"[{"pair":"a","time":"1","type":"b"}]"#)
            .await
            .unwrap_err();
        assert_eq!(err, ConsoleError::AccessDenied);
        assert!(store.calls().is_empty());
        assert!(matches!(service.flush().await, Err(ConsoleError::AccessDenied)));
    }

    #[tokio::test]
    async fn test_flush_deletes_queue() {
        let store = Arc::new(MockDocumentStore::new().with_document(SIGNAL_COLLECTION, "DOC_9", json!({})));
        let service = admin_service(&store);

        assert_eq!(service.flush().await.unwrap(), FlushOutcome::Flushed("DOC_9".to_string()));
        assert!(service.current().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush_without_queue_is_not_an_error() {
        let store = Arc::new(MockDocumentStore::new());
        let service = admin_service(&store);

        assert_eq!(service.flush().await.unwrap(), FlushOutcome::NothingToFlush);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces() {
        let store = Arc::new(MockDocumentStore::new().failing("quota exceeded"));
        let service = admin_service(&store);

        let err = service
            .ingest(r#"[{"pair":"a","time":"1","type":"b"}]"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_draft_kept_on_failure_cleared_on_success() {
        let store = Arc::new(MockDocumentStore::new());
        let service = admin_service(&store);

        let mut draft = IngestDraft::new("not json");
        assert!(draft.submit(&service).await.is_err());
        assert_eq!(draft.text(), "not json");
        assert!(draft.status().unwrap().starts_with("INJECTION FAILED: "));

        let mut draft = IngestDraft::new(r#"[{"pair":"a","time":"1","type":"b"}]"#);
        draft.submit(&service).await.unwrap();
        assert_eq!(draft.text(), "");
        assert_eq!(draft.status(), Some(BROADCAST_SUCCESS_MESSAGE));
    }

    #[tokio::test]
    async fn test_watch_sees_commit() {
        let store = Arc::new(MockDocumentStore::new());
        let service = admin_service(&store);
        let mut rx = service.watch();

        let initial = rx.recv().await.unwrap().unwrap();
        assert!(SignalQueueService::snapshot_of(&initial).unwrap().is_none());

        service.ingest(r#"[{"pair":"a","time":"1","type":"b"}]"#).await.unwrap();
        let next = rx.recv().await.unwrap().unwrap();
        let queue = SignalQueueService::snapshot_of(&next).unwrap().unwrap();
        assert_eq!(queue.document.len(), 1);
    }
}
