//! Firestore Value Encoding
//!
//! Converts between plain JSON field sets and Firestore's typed REST
//! representation (`{"stringValue": ..}`, `{"mapValue": {"fields": ..}}`).
//! Native timestamps decode to RFC 3339 strings; named top-level fields
//! holding RFC 3339 strings encode back to native timestamps.

use chrono::DateTime;
use serde_json::{json, Map, Value};

use crate::ports::{Fields, ProviderError};

/// Encode a field set as the `fields` object of a Firestore document
pub fn encode_fields(fields: &Fields) -> Value {
    let encoded: Map<String, Value> = fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect();
    Value::Object(encoded)
}

/// Encode a field set, writing `timestamp_fields` as `timestampValue`.
///
/// A listed field whose value is not an RFC 3339 string is encoded as usual.
pub fn encode_document_fields(fields: &Fields, timestamp_fields: &[String]) -> Value {
    let encoded: Map<String, Value> = fields
        .iter()
        .map(|(key, value)| {
            let encoded = match value {
                Value::String(s)
                    if timestamp_fields.iter().any(|f| f == key)
                        && DateTime::parse_from_rfc3339(s).is_ok() =>
                {
                    json!({ "timestampValue": s })
                }
                other => encode_value(other),
            };
            (key.clone(), encoded)
        })
        .collect();
    Value::Object(encoded)
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // integerValue travels as a decimal string
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or(f64::NAN) }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Decode the `fields` object of a Firestore document
pub fn decode_fields(fields: &Value) -> Result<Fields, ProviderError> {
    match fields {
        Value::Null => Ok(Fields::new()),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
            .collect(),
        other => Err(ProviderError::InvalidResponse(format!(
            "document fields must be an object, got {}",
            other
        ))),
    }
}

pub fn decode_value(value: &Value) -> Result<Value, ProviderError> {
    let Some((kind, inner)) = value.as_object().and_then(|m| m.iter().next()) else {
        return Err(ProviderError::InvalidResponse(format!("untyped value {}", value)));
    };

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or(false)),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| ProviderError::InvalidResponse(format!("bad integerValue {}", inner)))?
        }
        "doubleValue" => match inner {
            Value::Number(_) => inner.clone(),
            // NaN and Infinity arrive as strings
            Value::String(s) => Value::String(s.clone()),
            other => return Err(ProviderError::InvalidResponse(format!("bad doubleValue {}", other))),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            Value::String(inner.as_str().unwrap_or_default().to_string())
        }
        "geoPointValue" => inner.clone(),
        "arrayValue" => {
            let items = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Value::Array(items)
        }
        "mapValue" => Value::Object(decode_fields(inner.get("fields").unwrap_or(&Value::Null))?),
        other => {
            return Err(ProviderError::InvalidResponse(format!("unknown value type {}", other)));
        }
    };
    Ok(decoded)
}

/// Field path usable in an update mask
pub fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Last segment of a document resource name
pub fn document_id(name: &str) -> Option<&str> {
    name.rsplit('/').next().filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LicenseRecord, TIMESTAMP_FIELDS};
    use crate::ports::to_fields;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_encode_queue_document() {
        let fields = json!({
            "signalDate": "2026-10-18",
            "tradingQueue": [{"pair": "EURUSD", "time": "10:00", "type": "CALL"}],
            "version": "7.2"
        });
        let encoded = encode_fields(fields.as_object().unwrap());

        assert_eq!(encoded["signalDate"], json!({"stringValue": "2026-10-18"}));
        assert_eq!(
            encoded["tradingQueue"]["arrayValue"]["values"][0]["mapValue"]["fields"]["pair"],
            json!({"stringValue": "EURUSD"})
        );
    }

    #[test]
    fn test_instant_fields_encode_as_timestamps() {
        let record = LicenseRecord::provisioned(
            "uid-1",
            "node@desk.io",
            "secret1",
            Utc.with_ymd_and_hms(2026, 10, 18, 3, 56, 37).unwrap(),
        );
        let fields = to_fields(&record).unwrap();
        let timestamp_fields: Vec<String> = TIMESTAMP_FIELDS.iter().map(|f| f.to_string()).collect();
        let encoded = encode_document_fields(&fields, &timestamp_fields);

        assert_eq!(encoded["endDate"], json!({"timestampValue": "2026-11-17T03:56:37.000Z"}));
        assert_eq!(encoded["provisionedAt"], json!({"timestampValue": "2026-10-18T03:56:37.000Z"}));
        assert_eq!(encoded["email"], json!({"stringValue": "node@desk.io"}));

        // Decoding gives back the stored string
        let decoded = decode_fields(&encoded).unwrap();
        assert_eq!(decoded["endDate"], "2026-11-17T03:56:37.000Z");
    }

    #[test]
    fn test_unlisted_or_unparseable_instants_stay_strings() {
        let fields = json!({
            "lastUpdated": "2026-10-18T03:56:37.369Z",
            "timestamp": "not a date"
        });
        let encoded = encode_document_fields(fields.as_object().unwrap(), &["timestamp".to_string()]);

        assert_eq!(encoded["lastUpdated"], json!({"stringValue": "2026-10-18T03:56:37.369Z"}));
        assert_eq!(encoded["timestamp"], json!({"stringValue": "not a date"}));
    }

    #[test]
    fn test_numbers_keep_their_kind() {
        assert_eq!(encode_value(&json!(42)), json!({"integerValue": "42"}));
        assert_eq!(encode_value(&json!(1.5)), json!({"doubleValue": 1.5}));
        assert_eq!(decode_value(&json!({"integerValue": "42"})).unwrap(), json!(42));
        assert_eq!(decode_value(&json!({"doubleValue": 1.5})).unwrap(), json!(1.5));
    }

    #[test]
    fn test_decode_timestamp_as_string() {
        let raw = json!({
            "timestamp": {"timestampValue": "2026-10-18T09:30:00.120Z"},
            "admin": {"nullValue": null},
            "tags": {"arrayValue": {}},
            "meta": {"mapValue": {}}
        });
        let fields = decode_fields(&raw).unwrap();
        assert_eq!(fields["timestamp"], "2026-10-18T09:30:00.120Z");
        assert_eq!(fields["admin"], Value::Null);
        assert_eq!(fields["tags"], json!([]));
        assert_eq!(fields["meta"], json!({}));
    }

    #[test]
    fn test_decode_rejects_untyped() {
        assert!(decode_value(&json!("bare")).is_err());
        assert!(decode_value(&json!({"mysteryValue": 1})).is_err());
    }

    #[test]
    fn test_field_path_quoting() {
        assert_eq!(field_path("todayUserAccessKey"), "todayUserAccessKey");
        assert_eq!(field_path("last-update"), "`last-update`");
        assert_eq!(field_path("1st"), "`1st`");
    }

    #[test]
    fn test_document_id_from_name() {
        let name = "projects/p/databases/(default)/documents/qx-activity-logs/AbC123";
        assert_eq!(document_id(name), Some("AbC123"));
        assert_eq!(document_id("trailing/"), None);
    }
}
