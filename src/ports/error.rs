use thiserror::Error;

/// Failure of a call against the identity provider or document store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity already exists: {0}")]
    AlreadyExists(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("No principal is signed in")]
    NotSignedIn,

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
