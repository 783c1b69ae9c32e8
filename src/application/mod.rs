//! Application Layer - Console use cases
//!
//! Coordinates the domain rules with the identity and document ports:
//! - `access_gate`: session gating against the access policy
//! - `signal_queue`: bulk injection and flushing of the signal queue
//! - `identities` / `licenses`: access-key record management
//! - `activity_log`: operator action log
//! - `console`: wiring of all of the above

pub mod access_gate;
pub mod activity_log;
pub mod console;
pub mod error;
pub mod guard;
pub mod identities;
pub mod licenses;
pub mod signal_queue;

pub use access_gate::{AccessGate, GateHandle, GateState};
pub use activity_log::ActivityLog;
pub use console::Console;
pub use error::ConsoleError;
pub use guard::OperatorGuard;
pub use identities::IdentityRegistry;
pub use licenses::LicenseRegistry;
pub use signal_queue::{
    FlushOutcome, IngestDraft, IngestReceipt, QueueSnapshot, SignalQueueService,
    BROADCAST_SUCCESS_MESSAGE, QUEUE_FLUSHED_MESSAGE,
};
