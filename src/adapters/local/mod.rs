//! Local Backend
//!
//! File-backed identity and document providers for running the console
//! without a managed backend (development, demos, offline operation).

mod identity;
mod store;

pub use identity::LocalIdentityProvider;
pub use store::LocalDocumentStore;

use std::path::Path;

/// Subdirectory holding collection files
pub const DOCUMENTS_DIR: &str = "documents";

/// Account file, relative to the data directory
pub const ACCOUNTS_FILE: &str = "identity/accounts.json";

/// Open both local providers under one data directory
pub fn open_backend(
    data_dir: &Path,
) -> Result<(LocalIdentityProvider, LocalDocumentStore), crate::ports::ProviderError> {
    let identity = LocalIdentityProvider::open(data_dir.join(ACCOUNTS_FILE))?;
    let store = LocalDocumentStore::open(data_dir.join(DOCUMENTS_DIR))?;
    Ok((identity, store))
}
