//! Local Document Store
//!
//! File-backed implementation of the document store port. Each collection
//! lives in `<root>/<collection>.json` as a map of document id to fields
//! and is rewritten atomically (temp file + rename) on every mutation.
//! Live reads are served to subscribers inside the same process.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::ports::documents::{
    CollectionQuery, CollectionReceiver, CollectionSnapshot, Document, DocumentStore, Fields,
    WriteMode,
};
use crate::ports::ProviderError;

type Collection = BTreeMap<String, Fields>;

/// Length of store-assigned document ids
const GENERATED_ID_LEN: usize = 20;

struct Watcher {
    query: CollectionQuery,
    tx: mpsc::UnboundedSender<CollectionSnapshot>,
}

pub struct LocalDocumentStore {
    root: Option<PathBuf>,
    collections: Mutex<BTreeMap<String, Collection>>,
    watchers: Mutex<Vec<Watcher>>,
}

impl LocalDocumentStore {
    /// Store that keeps everything in memory
    pub fn in_memory() -> Self {
        Self {
            root: None,
            collections: Mutex::new(BTreeMap::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Store persisted under `root`, created if missing
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| ProviderError::Storage(format!("create {}: {}", root.display(), e)))?;

        tracing::debug!("Local document store at {}", root.display());

        Ok(Self {
            root: Some(root),
            collections: Mutex::new(BTreeMap::new()),
            watchers: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}.json", collection)))
    }

    fn load_collection(&self, collection: &str) -> Result<Collection, ProviderError> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(Collection::new());
        };
        if !path.exists() {
            return Ok(Collection::new());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| ProviderError::Storage(format!("read {}: {}", path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Collection::new());
        }

        serde_json::from_str(&content)
            .map_err(|e| ProviderError::Storage(format!("corrupted {}: {}", path.display(), e)))
    }

    fn persist_collection(&self, collection: &str, docs: &Collection) -> Result<(), ProviderError> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(docs)
            .map_err(|e| ProviderError::Storage(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .map_err(|e| ProviderError::Storage(format!("write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| ProviderError::Storage(format!("rename {}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Run `f` against a collection, loading it on first use
    fn with_collection<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Collection) -> R,
    ) -> Result<R, ProviderError> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| ProviderError::Storage("store lock poisoned".to_string()))?;

        if !collections.contains_key(collection) {
            let loaded = self.load_collection(collection)?;
            collections.insert(collection.to_string(), loaded);
        }

        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| ProviderError::Storage(format!("collection {} unavailable", collection)))?;
        Ok(f(docs))
    }

    /// Apply a mutation, persist the collection and notify watchers.
    ///
    /// A failing mutation leaves both the file and the cache untouched.
    fn mutate<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Collection) -> Result<R, ProviderError>,
    ) -> Result<R, ProviderError> {
        self.with_collection(collection, |docs| {
            // Commit in memory only once the file write went through
            let mut next = docs.clone();
            let result = f(&mut next)?;
            self.persist_collection(collection, &next)?;
            *docs = next;
            self.notify(collection, docs);
            Ok(result)
        })?
    }

    fn snapshot(&self, query: &CollectionQuery) -> Result<Vec<Document>, ProviderError> {
        let docs = self.with_collection(&query.collection, |docs| to_documents(docs))?;
        Ok(query.apply(docs))
    }

    fn notify(&self, collection: &str, docs: &Collection) {
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        watchers.retain(|w| {
            if w.query.collection != collection {
                return !w.tx.is_closed();
            }
            w.tx.send(Ok(w.query.apply(to_documents(docs)))).is_ok()
        });
    }
}

fn to_documents(docs: &Collection) -> Vec<Document> {
    docs.iter()
        .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
        .collect()
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    fn watch_collection(&self, query: CollectionQuery) -> CollectionReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(self.snapshot(&query));

        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.push(Watcher { query, tx });
        }
        rx
    }

    async fn query(&self, query: &CollectionQuery) -> Result<Vec<Document>, ProviderError> {
        self.snapshot(query)
    }

    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), ProviderError> {
        self.mutate(collection, |docs| {
            match mode {
                WriteMode::Replace => {
                    docs.insert(id.to_string(), fields);
                }
                WriteMode::Merge => {
                    docs.entry(id.to_string()).or_default().extend(fields);
                }
                WriteMode::Update => {
                    let existing = docs
                        .get_mut(id)
                        .ok_or_else(|| ProviderError::NotFound(format!("{}/{}", collection, id)))?;
                    existing.extend(fields);
                }
            }
            Ok(())
        })?;

        tracing::debug!("Wrote {}/{} ({:?})", collection, id, mode);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), ProviderError> {
        let removed = self.mutate(collection, |docs| Ok(docs.remove(id).is_some()))?;
        tracing::debug!("Deleted {}/{} (existed: {})", collection, id, removed);
        Ok(())
    }

    async fn add_document(&self, collection: &str, fields: Fields) -> Result<String, ProviderError> {
        let id = self.mutate(collection, |docs| {
            let mut id = generate_id();
            while docs.contains_key(&id) {
                id = generate_id();
            }
            docs.insert(id.clone(), fields);
            Ok(id)
        })?;
        Ok(id)
    }
}
