//! Nexus Terminal - Super-admin console library
//!
//! Operator console for a trading-signal distribution service: gates the
//! session on the super-admin identity, publishes the daily signal queue
//! and manages user licenses.
//!
//! # Modules
//!
//! - `domain`: Core types and rules (Principal, AccessPolicy, signal queue, licenses)
//! - `ports`: Trait abstractions (IdentityProvider, DocumentStore)
//! - `adapters`: External implementations (Local, Firebase, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Access gate, console services and wiring

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;
