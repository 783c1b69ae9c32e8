//! Activity Log
//!
//! Append-only record of operator actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::license::format_timestamp;

/// Collection holding activity entries
pub const ACTIVITY_COLLECTION: &str = "qx-activity-logs";

/// Entries shown by default
pub const DEFAULT_ACTIVITY_LIMIT: usize = 20;

/// Action recorded when a new identity is provisioned
pub const ACTION_PROVISION: &str = "PROVISION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// Store-assigned identity
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub timestamp: String,
    /// Email of the operator who performed the action
    #[serde(default)]
    pub admin: Option<String>,
}

impl ActivityLogEntry {
    pub fn new(action: &str, detail: &str, admin: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            action: action.to_string(),
            detail: detail.to_string(),
            timestamp: format_timestamp(at),
            admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_fields() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let entry = ActivityLogEntry::new(
            ACTION_PROVISION,
            "Node Deployed: node@desk.io",
            Some("dokkustic@admin.com".to_string()),
            at,
        );
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["action"], "PROVISION");
        assert_eq!(value["timestamp"], "2026-10-18T08:00:00.000Z");
        assert_eq!(value["admin"], "dokkustic@admin.com");
        assert!(value.get("id").is_none());
    }
}
