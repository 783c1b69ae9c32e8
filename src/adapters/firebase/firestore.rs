//! Firestore REST Store
//!
//! Document store over the Firestore v1 REST API:
//! - full writes are `PATCH` without a mask, merges `PATCH` with
//!   `updateMask.fieldPaths` for each written field; updates add the
//!   `currentDocument.exists=true` precondition
//! - instant fields are written as native timestamps
//! - appends `POST` to the collection and read the id from the resource name
//! - reads go through `:runQuery`
//!
//! REST has no push channel, so live reads poll and emit only on change.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::auth::FirebaseAuth;
use super::value::{decode_fields, document_id, encode_document_fields, field_path};
use super::{read_json, FirebaseOptions};
use crate::ports::documents::{
    CollectionQuery, CollectionReceiver, CollectionSnapshot, Document, DocumentStore, Fields,
    SortDirection, WriteMode,
};
use crate::ports::ProviderError;

#[derive(Clone)]
pub struct FirestoreStore {
    http: Client,
    options: FirebaseOptions,
    auth: Option<Arc<FirebaseAuth>>,
}

impl FirestoreStore {
    pub fn new(http: Client, options: FirebaseOptions, auth: Option<Arc<FirebaseAuth>>) -> Self {
        Self { http, options, auth }
    }

    pub fn project_id(&self) -> &str {
        &self.options.project_id
    }

    fn document_body(&self, fields: &Fields) -> Value {
        json!({ "fields": encode_document_fields(fields, &self.options.timestamp_fields) })
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.options.documents_url(), collection, id)
    }

    /// Attach the session's bearer token, if signed in
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        let token = match &self.auth {
            Some(auth) => auth.id_token().await?,
            None => None,
        };
        Ok(match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        self.authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))
    }

    async fn run_query(&self, query: &CollectionQuery) -> Result<Vec<Document>, ProviderError> {
        let url = format!("{}:runQuery", self.options.documents_url());
        let response = self
            .send(self.http.post(url).json(&structured_query(query)))
            .await?;
        let body = read_json(response).await?;
        parse_run_query(&body)
    }

    async fn poll(self, query: CollectionQuery, tx: mpsc::UnboundedSender<CollectionSnapshot>) {
        let mut last: Option<CollectionSnapshot> = None;
        loop {
            let snapshot = self.run_query(&query).await;
            if last.as_ref() != Some(&snapshot) {
                if let Err(e) = &snapshot {
                    tracing::warn!("Watch on {} failed: {}", query.collection, e);
                }
                if tx.send(snapshot.clone()).is_err() {
                    break;
                }
                last = Some(snapshot);
            }

            tokio::select! {
                _ = tx.closed() => break,
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }
        tracing::debug!("Watch on {} closed", query.collection);
    }
}

/// `:runQuery` request body for a collection read
fn structured_query(query: &CollectionQuery) -> Value {
    let mut structured = json!({
        "from": [{ "collectionId": query.collection }],
    });
    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            SortDirection::Ascending => "ASCENDING",
            SortDirection::Descending => "DESCENDING",
        };
        structured["orderBy"] = json!([
            { "field": { "fieldPath": field_path(&order.field) }, "direction": direction },
            { "field": { "fieldPath": "__name__" }, "direction": "ASCENDING" },
        ]);
    }
    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }
    json!({ "structuredQuery": structured })
}

/// Decode the result stream of `:runQuery`. Entries without a document
/// (read-time markers) are skipped.
fn parse_run_query(body: &Value) -> Result<Vec<Document>, ProviderError> {
    let entries = body
        .as_array()
        .ok_or_else(|| ProviderError::InvalidResponse("runQuery must return an array".to_string()))?;

    entries
        .iter()
        .filter_map(|entry| entry.get("document"))
        .map(parse_document)
        .collect()
}

fn parse_document(doc: &Value) -> Result<Document, ProviderError> {
    let name = doc["name"]
        .as_str()
        .ok_or_else(|| ProviderError::InvalidResponse("document without a name".to_string()))?;
    let id = document_id(name)
        .ok_or_else(|| ProviderError::InvalidResponse(format!("bad document name {}", name)))?;
    let fields = decode_fields(doc.get("fields").unwrap_or(&Value::Null))?;
    Ok(Document::new(id, fields))
}

/// Query parameters of a write: one mask entry per field for merges
fn write_params(fields: &Fields, mode: WriteMode) -> Vec<(&'static str, String)> {
    let mask = || {
        fields
            .keys()
            .map(|key| ("updateMask.fieldPaths", field_path(key)))
            .collect::<Vec<_>>()
    };
    match mode {
        WriteMode::Replace => Vec::new(),
        WriteMode::Merge => mask(),
        WriteMode::Update => {
            let mut params = mask();
            params.push(("currentDocument.exists", "true".to_string()));
            params
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn watch_collection(&self, query: CollectionQuery) -> CollectionReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().poll(query, tx));
        rx
    }

    async fn query(&self, query: &CollectionQuery) -> Result<Vec<Document>, ProviderError> {
        self.run_query(query).await
    }

    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), ProviderError> {
        let request = self
            .http
            .patch(self.document_url(collection, id))
            .query(&write_params(&fields, mode))
            .json(&self.document_body(&fields));

        let response = self.send(request).await?;
        if mode == WriteMode::Update && response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(format!("{}/{}", collection, id)));
        }
        read_json(response).await?;
        tracing::debug!("Wrote {}/{} ({:?})", collection, id, mode);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), ProviderError> {
        let response = self
            .send(self.http.delete(self.document_url(collection, id)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        read_json(response).await?;
        tracing::debug!("Deleted {}/{}", collection, id);
        Ok(())
    }

    async fn add_document(&self, collection: &str, fields: Fields) -> Result<String, ProviderError> {
        let url = format!("{}/{}", self.options.documents_url(), collection);
        let request = self
            .http
            .post(url)
            .json(&self.document_body(&fields));

        let body = read_json(self.send(request).await?).await?;
        Ok(parse_document(&body)?.id)
    }
}
