//! Trading Signal Queue
//!
//! The daily queue of trade signals and the strict batch parser that
//! turns operator-supplied JSON into an ordered, normalized queue.
//!
//! Batch validation follows the loose typing the downstream bots rely on:
//! a field counts as present when it is "truthy" (not absent, `null`,
//! `false`, `0` or `""`) and values are coerced to strings the same way a
//! JavaScript `String(value)` call would.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Collection holding the single queue document
pub const SIGNAL_COLLECTION: &str = "qx-todaySignal-autoTrading-bot";

/// Version label stamped on every committed queue
pub const QUEUE_VERSION: &str = "7.2";

/// Batch validation failures. The first failure wins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("{0}")]
    Parse(String),

    #[error("Input must be an array of objects")]
    Shape,

    #[error("Item at index {index} is missing required fields (pair, time, type)")]
    Field { index: usize },
}

impl IngestError {
    /// Index of the offending element, for field errors
    pub fn index(&self) -> Option<usize> {
        match self {
            IngestError::Field { index } => Some(*index),
            _ => None,
        }
    }
}

/// One entry of the daily queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Market identifier, upper-cased (e.g. EURUSD)
    #[serde(default)]
    pub pair: String,
    /// Execution time marker, kept verbatim
    #[serde(default)]
    pub time: String,
    /// Direction, upper-cased; CALL or PUT by convention only
    #[serde(rename = "type", default)]
    pub signal_type: String,
}

impl TradeSignal {
    pub fn new(pair: impl Into<String>, time: impl Into<String>, signal_type: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            time: time.into(),
            signal_type: signal_type.into(),
        }
    }

    pub fn is_call(&self) -> bool {
        self.signal_type == "CALL"
    }

    pub fn is_put(&self) -> bool {
        self.signal_type == "PUT"
    }
}

/// The persisted queue aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalQueueDocument {
    /// Calendar date (UTC) the queue was committed for
    #[serde(default)]
    pub signal_date: String,
    /// Ordered signals, exactly as submitted
    #[serde(default)]
    pub trading_queue: Vec<TradeSignal>,
    /// Commit timestamp, RFC 3339 with milliseconds
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub version: String,
}

impl SignalQueueDocument {
    /// Build the document committed at `now`
    pub fn new(trading_queue: Vec<TradeSignal>, now: DateTime<Utc>) -> Self {
        Self {
            signal_date: now.format("%Y-%m-%d").to_string(),
            trading_queue,
            last_updated: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            version: QUEUE_VERSION.to_string(),
        }
    }

    /// Identity used when no queue document exists yet
    pub fn fresh_id(now: DateTime<Utc>) -> String {
        format!("DOC_{}", now.timestamp_millis())
    }

    pub fn len(&self) -> usize {
        self.trading_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trading_queue.is_empty()
    }
}

/// Parse and validate a batch of signals.
///
/// Fails fast on the first problem; nothing is returned for partially
/// valid input.
pub fn parse_signal_batch(raw: &str) -> Result<Vec<TradeSignal>, IngestError> {
    let parsed: Value = serde_json::from_str(raw).map_err(|e| IngestError::Parse(e.to_string()))?;

    let items = match parsed {
        Value::Array(items) => items,
        _ => return Err(IngestError::Shape),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let pair = item.get("pair");
            let time = item.get("time");
            let signal_type = item.get("type");

            match (pair, time, signal_type) {
                (Some(pair), Some(time), Some(signal_type))
                    if is_truthy(pair) && is_truthy(time) && is_truthy(signal_type) =>
                {
                    Ok(TradeSignal {
                        pair: coerce_to_string(pair).to_uppercase(),
                        time: coerce_to_string(time),
                        signal_type: coerce_to_string(signal_type).to_uppercase(),
                    })
                }
                _ => Err(IngestError::Field { index }),
            }
        })
        .collect()
}

/// JavaScript truthiness of a JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// JavaScript `String(value)` coercion of a JSON value
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        // Integral floats print without a fractional part
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i128),
        Some(f) if f.abs() >= 1e21 || f.abs() < 1e-6 => exponent_form(f),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Shortest exponent form with a signed exponent, e.g. `1.5e+21` or `1e-7`
fn exponent_form(f: f64) -> String {
    let formatted = format!("{:e}", f);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => formatted,
    }
}
