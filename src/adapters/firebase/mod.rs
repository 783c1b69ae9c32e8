//! Firebase Adapter
//!
//! Identity Toolkit and Firestore REST clients implementing the identity
//! and document store ports.

mod auth;
mod firestore;
pub mod value;

pub use auth::FirebaseAuth;
pub use firestore::FirestoreStore;

use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::TIMESTAMP_FIELDS;
use crate::ports::ProviderError;

/// Connection settings shared by both clients
#[derive(Debug, Clone)]
pub struct FirebaseOptions {
    pub api_key: String,
    pub project_id: String,
    /// Identity Toolkit base URL
    pub auth_base_url: String,
    /// Secure Token service base URL (id token refresh)
    pub token_base_url: String,
    /// Firestore base URL
    pub firestore_base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Interval between reads of a watched collection
    pub poll_interval: Duration,
    /// Top-level fields written as native timestamps
    pub timestamp_fields: Vec<String>,
}

impl FirebaseOptions {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            auth_base_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
            token_base_url: "https://securetoken.googleapis.com/v1".to_string(),
            firestore_base_url: "https://firestore.googleapis.com/v1".to_string(),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            timestamp_fields: TIMESTAMP_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Root of the default database's document tree
    pub fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.firestore_base_url, self.project_id
        )
    }
}

/// Build both providers over one HTTP client
pub fn connect(options: FirebaseOptions) -> Result<(Arc<FirebaseAuth>, FirestoreStore), ProviderError> {
    let http = Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|e| ProviderError::Request(format!("Failed to create HTTP client: {}", e)))?;

    let auth = Arc::new(FirebaseAuth::new(http.clone(), options.clone()));
    let store = FirestoreStore::new(http, options, Some(auth.clone()));

    tracing::debug!("Firebase providers ready for project {}", store.project_id());
    Ok((auth, store))
}

/// Read a JSON body, turning non-success statuses into `Rejected`
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::Request(e.to_string()))?;

    if !status.is_success() {
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

/// Google API errors carry `{"error": {"message": ..}}`; fall back to the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
