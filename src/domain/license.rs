//! License Records
//!
//! Access-key records keyed by the identity uid. Each record carries the
//! rotating daily access token handed to the trading bot, the identified
//! email and the expiry instant.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Collection holding user identities and their license keys
pub const ACCESS_KEY_COLLECTION: &str = "qx-autoTrading-bot-access-key";

/// Validity granted to a freshly provisioned identity
pub const DEFAULT_LICENSE_DAYS: i64 = 30;

/// A license this close to expiry is reported as EXPIRING
pub const EXPIRING_WINDOW_DAYS: i64 = 3;

/// Provider-side minimum password length
pub const MIN_PASSWORD_LEN: usize = 6;

const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LicenseError {
    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("Password must be at least 6 characters")]
    WeakPassword,

    #[error("Invalid expiration {0:?}: expected RFC 3339, YYYY-MM-DDTHH:MM or YYYY-MM-DD")]
    InvalidExpiry(String),

    #[error("Access token cannot be empty")]
    EmptyToken,
}

/// Derived license state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseStatus {
    Active,
    Expiring,
    Expired,
}

impl LicenseStatus {
    /// Classify an expiry instant relative to `now`
    pub fn classify(end_date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if end_date <= now {
            LicenseStatus::Expired
        } else if end_date - now <= Duration::days(EXPIRING_WINDOW_DAYS) {
            LicenseStatus::Expiring
        } else {
            LicenseStatus::Active
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseStatus::Active => write!(f, "ACTIVE"),
            LicenseStatus::Expiring => write!(f, "EXPIRING"),
            LicenseStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A record of the access-key collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    /// Document identity (the provider uid); not part of the stored fields
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub uid: String,
    /// Rotating daily access token; empty while idle
    #[serde(default)]
    pub today_user_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_password_update: Option<String>,
}

impl LicenseRecord {
    /// Record written when a new identity is provisioned at `now`
    pub fn provisioned(uid: &str, email: &str, password: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uid.to_string(),
            email: email.to_string(),
            uid: uid.to_string(),
            today_user_access_key: String::new(),
            password: Some(password.to_string()),
            end_date: Some(format_timestamp(now + Duration::days(DEFAULT_LICENSE_DAYS))),
            provisioned_at: Some(format_timestamp(now)),
            status: Some("ACTIVE".to_string()),
            updated_at: None,
            last_password_update: None,
        }
    }

    /// Parsed expiry, if present and well-formed
    pub fn end_date_utc(&self) -> Option<DateTime<Utc>> {
        self.end_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Derived status at `now`; `None` when no expiry is recorded
    pub fn status_at(&self, now: DateTime<Utc>) -> Option<LicenseStatus> {
        self.end_date_utc().map(|end| LicenseStatus::classify(end, now))
    }

    /// True while no access token has been issued
    pub fn is_idle(&self) -> bool {
        self.today_user_access_key.is_empty()
    }
}

/// Generate a token of the form `QX-XXXX-XXXX-XXXX`
pub fn generate_access_key<R: Rng>(rng: &mut R) -> String {
    let mut key = String::from("QX-");
    for i in 0..12 {
        let idx = rng.gen_range(0..KEY_ALPHABET.len());
        key.push(KEY_ALPHABET[idx] as char);
        if i == 3 || i == 7 {
            key.push('-');
        }
    }
    key
}

/// Validate the credentials of an identity about to be provisioned
pub fn validate_credentials(email: &str, password: &str) -> Result<(), LicenseError> {
    let email_ok = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace),
        None => false,
    };
    if !email_ok {
        return Err(LicenseError::InvalidEmail(email.to_string()));
    }
    validate_password(password)
}

pub fn validate_password(password: &str) -> Result<(), LicenseError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(LicenseError::WeakPassword);
    }
    Ok(())
}

/// Parse an operator-entered expiry. Zone-less forms are taken as UTC.
pub fn parse_expiry(input: &str) -> Result<DateTime<Utc>, LicenseError> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(LicenseError::InvalidExpiry(input.to_string()))
}

/// Stored fields that hold instants, across the access-key and activity
/// collections. Providers with a native timestamp type store these as such.
pub const TIMESTAMP_FIELDS: &[&str] = &[
    "endDate",
    "provisionedAt",
    "updatedAt",
    "lastPasswordUpdate",
    "timestamp",
];

/// Storage format for timestamps
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
