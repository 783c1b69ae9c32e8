//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Identity provider (sign-in, session notifications, user creation)
//! - Document store (live collection reads, writes, deletes, appends)

pub mod error;
pub mod identity;
pub mod documents;
#[cfg(test)]
pub mod mocks;

// Re-export main traits and types
pub use error::ProviderError;
pub use identity::{AuthStateBroadcaster, AuthStateReceiver, IdentityProvider};
pub use documents::{
    to_fields, CollectionQuery, CollectionReceiver, CollectionSnapshot, Document, DocumentStore,
    Fields, SortDirection, WriteMode,
};
