//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    Backend, Config, ConfigError, FieldStatus, FirebaseSection, load_config,
};
