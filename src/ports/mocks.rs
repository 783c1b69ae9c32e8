//! In-process port doubles that record calls and allow scripted responses

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::documents::{
    CollectionQuery, CollectionReceiver, CollectionSnapshot, Document, DocumentStore, Fields,
    WriteMode,
};
use super::error::ProviderError;
use super::identity::{AuthStateBroadcaster, AuthStateReceiver, IdentityProvider};
use crate::domain::Principal;

/// Identity provider whose notifications are driven by the test
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    session: Mutex<Option<Principal>>,
    accounts: Mutex<HashMap<String, (String, String)>>,
    broadcaster: AuthStateBroadcaster,
    sign_out_calls: AtomicUsize,
    created: Mutex<Vec<String>>,
    fail_sign_out: bool,
    fail_create: Option<String>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to accept a credential pair on sign-in
    pub fn with_account(self, uid: &str, email: &str, password: &str) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (uid.to_string(), password.to_string()));
        self
    }

    /// Builder method to start with a signed-in principal, without notifying
    pub fn with_session(self, principal: Principal) -> Self {
        *self.session.lock().unwrap() = Some(principal);
        self
    }

    /// Builder method to make every sign-out fail
    pub fn failing_sign_out(mut self) -> Self {
        self.fail_sign_out = true;
        self
    }

    /// Builder method to make account creation fail with `message`
    pub fn failing_create(mut self, message: &str) -> Self {
        self.fail_create = Some(message.to_string());
        self
    }

    /// Deliver an authentication-state notification to every subscriber
    pub fn emit(&self, state: Option<Principal>) {
        *self.session.lock().unwrap() = state.clone();
        self.broadcaster.publish(state);
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// Emails of identities created through the isolated instance
    pub fn created_users(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn watch_auth_state(&self) -> AuthStateReceiver {
        self.broadcaster.subscribe(None)
    }

    fn current_principal(&self) -> Option<Principal> {
        self.session.lock().unwrap().clone()
    }

    async fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, ProviderError> {
        let account = self.accounts.lock().unwrap().get(email).cloned();
        match account {
            Some((uid, expected)) if expected == password => {
                let principal = Principal::new(uid, email);
                self.emit(Some(principal.clone()));
                Ok(principal)
            }
            _ => Err(ProviderError::InvalidCredentials),
        }
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out {
            return Err(ProviderError::Request("sign-out unavailable".to_string()));
        }
        self.emit(None);
        Ok(())
    }

    async fn create_user_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, ProviderError> {
        if let Some(message) = &self.fail_create {
            return Err(ProviderError::Rejected {
                status: 400,
                message: message.clone(),
            });
        }

        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(ProviderError::AlreadyExists(email.to_string()));
        }

        let mut created = self.created.lock().unwrap();
        let uid = format!("uid-{}", created.len() + 1);
        accounts.insert(email.to_string(), (uid.clone(), password.to_string()));
        created.push(email.to_string());
        Ok(uid)
    }
}

/// A mutation that reached the mock store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Write {
        collection: String,
        id: String,
        fields: Fields,
        mode: WriteMode,
    },
    Delete {
        collection: String,
        id: String,
    },
    Add {
        collection: String,
        fields: Fields,
    },
}

/// In-memory document store that records every mutation
#[derive(Debug, Default)]
pub struct MockDocumentStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Fields>>>,
    calls: Mutex<Vec<StoreCall>>,
    watchers: Mutex<Vec<(CollectionQuery, mpsc::UnboundedSender<CollectionSnapshot>)>>,
    next_id: AtomicUsize,
    failure: Option<String>,
    fail_adds: bool,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to seed a document (not recorded as a call)
    pub fn with_document(self, collection: &str, id: &str, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            other => panic!("document fields must be an object, got {}", other),
        };
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self
    }

    /// Builder method to make every mutation fail with `message`
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Builder method to make only appends fail
    pub fn failing_adds(mut self) -> Self {
        self.fail_adds = true;
        self
    }

    /// Get all recorded mutations
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Write { .. }))
            .count()
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        CollectionQuery::new(collection).apply(self.all(collection))
    }

    fn all(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record(&self, call: StoreCall) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(call);
        match &self.failure {
            Some(message) => Err(ProviderError::Request(message.clone())),
            None => Ok(()),
        }
    }

    fn notify(&self, collection: &str) {
        let docs = self.all(collection);
        self.watchers.lock().unwrap().retain(|(query, tx)| {
            if query.collection != collection {
                return !tx.is_closed();
            }
            tx.send(Ok(query.apply(docs.clone()))).is_ok()
        });
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    fn watch_collection(&self, query: CollectionQuery) -> CollectionReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(query.apply(self.all(&query.collection))));
        self.watchers.lock().unwrap().push((query, tx));
        rx
    }

    async fn query(&self, query: &CollectionQuery) -> Result<Vec<Document>, ProviderError> {
        Ok(query.apply(self.all(&query.collection)))
    }

    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), ProviderError> {
        self.record(StoreCall::Write {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: fields.clone(),
            mode,
        })?;

        {
            let mut collections = self.collections.lock().unwrap();
            let docs = collections.entry(collection.to_string()).or_default();
            match mode {
                WriteMode::Replace => {
                    docs.insert(id.to_string(), fields);
                }
                WriteMode::Merge => {
                    docs.entry(id.to_string()).or_default().extend(fields);
                }
                WriteMode::Update => match docs.get_mut(id) {
                    Some(existing) => existing.extend(fields),
                    None => {
                        return Err(ProviderError::NotFound(format!("{}/{}", collection, id)));
                    }
                },
            }
        }
        self.notify(collection);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), ProviderError> {
        self.record(StoreCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        if let Some(docs) = self.collections.lock().unwrap().get_mut(collection) {
            docs.remove(id);
        }
        self.notify(collection);
        Ok(())
    }

    async fn add_document(&self, collection: &str, fields: Fields) -> Result<String, ProviderError> {
        self.record(StoreCall::Add {
            collection: collection.to_string(),
            fields: fields.clone(),
        })?;
        if self.fail_adds {
            return Err(ProviderError::Request("append rejected".to_string()));
        }

        let id = format!("auto-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        self.notify(collection);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_identity_scripted_sign_in() {
        let mock = MockIdentityProvider::new().with_account("u1", "a@b.io", "pw1234");
        let mut rx = mock.watch_auth_state();

        let principal = mock.sign_in_with_credentials("a@b.io", "pw1234").await.unwrap();
        assert_eq!(rx.recv().await, Some(Some(principal)));
        assert!(mock.sign_in_with_credentials("a@b.io", "bad").await.is_err());

        mock.sign_out().await.unwrap();
        assert_eq!(rx.recv().await, Some(None));
        assert_eq!(mock.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_store_records_calls() {
        let mock = MockDocumentStore::new().with_document("c", "seed", json!({"a": 1}));

        let fields = json!({"b": 2}).as_object().cloned().unwrap();
        mock.write_document("c", "seed", fields, WriteMode::Merge).await.unwrap();

        assert_eq!(mock.write_count(), 1);
        assert_eq!(mock.document("c", "seed").unwrap(), json!({"a": 1, "b": 2}).as_object().cloned().unwrap());
    }

    #[tokio::test]
    async fn test_mock_store_failure() {
        let mock = MockDocumentStore::new().failing("offline");
        let err = mock.delete_document("c", "x").await.unwrap_err();
        assert_eq!(err, ProviderError::Request("offline".to_string()));
        assert_eq!(mock.calls().len(), 1);
    }
}
