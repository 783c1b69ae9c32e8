//! Domain Layer - Core console types and validation
//!
//! Pure types and rules with no provider dependencies. All provider
//! interactions happen through the ports layer.
//!
//! - `principal`: the authenticated operator identity
//! - `access`: access decisions and pluggable authorization policies
//! - `signal`: the daily trade-signal queue and its batch parser
//! - `license`: access-key records, key generation, expiry handling
//! - `activity`: operator activity log entries

pub mod principal;
pub mod access;
pub mod signal;
pub mod license;
pub mod activity;

pub use principal::Principal;
pub use access::{
    AccessDecision, AccessPolicy, SuperAdminPolicy, DENIAL_MESSAGE, PERMISSION_REQUIRED_MESSAGE,
    SUPER_ADMIN_EMAIL,
};
pub use signal::{
    parse_signal_batch, IngestError, SignalQueueDocument, TradeSignal, QUEUE_VERSION,
    SIGNAL_COLLECTION,
};
pub use license::{
    generate_access_key, parse_expiry, LicenseError, LicenseRecord, LicenseStatus,
    ACCESS_KEY_COLLECTION, TIMESTAMP_FIELDS,
};
pub use activity::{ActivityLogEntry, ACTION_PROVISION, ACTIVITY_COLLECTION, DEFAULT_ACTIVITY_LIMIT};
