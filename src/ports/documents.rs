//! Document Store Port
//!
//! Collection reads (one-shot and live), full-replace, merge or
//! update-existing writes, deletes and server-identified appends.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tokio::sync::mpsc;

use super::error::ProviderError;

/// Field set of a document
pub type Fields = Map<String, Value>;

/// One emission of a live collection read
pub type CollectionSnapshot = Result<Vec<Document>, ProviderError>;

/// Live collection read. Dropping it unsubscribes.
pub type CollectionReceiver = mpsc::UnboundedReceiver<CollectionSnapshot>;

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Deserialize the field set into a domain type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| ProviderError::InvalidResponse(format!("document {}: {}", self.id, e)))
    }
}

/// How a write treats fields already stored on the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The written fields become the entire document
    Replace,
    /// Only the written fields change; others are kept
    Merge,
    /// Like `Merge`, but fails with `ProviderError::NotFound` when the
    /// document does not exist yet
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// A collection read: optional single-field ordering and a limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    pub collection: String,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl CollectionQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: None,
            limit: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate the query over a full collection.
    ///
    /// Unordered reads come back by document id. Ordered reads skip
    /// documents that lack the order field, ties broken by id.
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        match &self.order_by {
            None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
            Some(order) => {
                docs.retain(|d| d.fields.contains_key(&order.field));
                docs.sort_by(|a, b| {
                    let ord = compare_values(&a.fields[&order.field], &b.fields[&order.field]);
                    let ord = match order.direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    };
                    ord.then_with(|| a.id.cmp(&b.id))
                });
            }
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Total order over JSON values: null < bool < number < string < array < object
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Live read: emits the current result set, then again on every change
    fn watch_collection(&self, query: CollectionQuery) -> CollectionReceiver;

    /// One-shot read
    async fn query(&self, query: &CollectionQuery) -> Result<Vec<Document>, ProviderError>;

    /// Write a document under a caller-chosen identity
    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), ProviderError>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), ProviderError>;

    /// Append a document; the store assigns and returns its identity
    async fn add_document(&self, collection: &str, fields: Fields) -> Result<String, ProviderError>;
}

/// Serialize a domain value into a field set
pub fn to_fields<T: serde::Serialize>(value: &T) -> Result<Fields, ProviderError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(ProviderError::InvalidResponse(format!(
            "expected an object, got {}",
            other
        ))),
        Err(e) => Err(ProviderError::InvalidResponse(e.to_string())),
    }
}
