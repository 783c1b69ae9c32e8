use thiserror::Error;

use crate::domain::{IngestError, LicenseError};
use crate::ports::ProviderError;

/// Failure of a console operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsoleError {
    #[error("ACCESS DENIED: SUPER ADMIN PERMISSION REQUIRED")]
    AccessDenied,

    #[error("{0}")]
    Ingest(#[from] IngestError),

    #[error("{0}")]
    License(#[from] LicenseError),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// The gate rejected the session; carries the gate's message
    #[error("{0}")]
    Unauthorized(String),

    #[error("No access decision within {0}s")]
    AuthTimeout(u64),
}
