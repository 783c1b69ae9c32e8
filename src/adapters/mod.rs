//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Local: file-backed identity provider and document store
//! - Firebase: Identity Toolkit and Firestore REST clients
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod firebase;
pub mod local;

pub use cli::CliApp;
pub use firebase::{FirebaseAuth, FirebaseOptions, FirestoreStore};
pub use local::{LocalDocumentStore, LocalIdentityProvider};
