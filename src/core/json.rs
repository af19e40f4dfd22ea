//! Extended JSON conventions for documents
//!
//! Documents travel as `serde_json::Value`. Identifiers and timestamps use the
//! MongoDB extended JSON wrappers so they survive the round-trip through a
//! BSON store unchanged:
//!
//! - `{"$oid": "<24 hex>"}` for object ids
//! - `{"$date": "<RFC 3339>"}` for datetimes
//!
//! [`encode_response`] flattens both wrappers into plain strings before a
//! payload leaves the server.

use bson::oid::ObjectId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

/// Wrap an object id
pub fn oid_value(id: &ObjectId) -> Value {
    json!({ "$oid": id.to_hex() })
}

/// Wrap a UTC datetime
pub fn date_value(dt: &DateTime<Utc>) -> Value {
    json!({ "$date": dt.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

/// Whether `s` is an id literal as it may appear in a URL: exactly 24
/// lowercase hex characters
pub fn is_object_id_literal(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Parse a URL id literal
pub fn parse_object_id(s: &str) -> Option<ObjectId> {
    if is_object_id_literal(s) {
        ObjectId::parse_str(s).ok()
    } else {
        None
    }
}

/// Read an `{"$oid": ...}` wrapper
pub fn as_object_id(value: &Value) -> Option<ObjectId> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    ObjectId::parse_str(map.get("$oid")?.as_str()?).ok()
}

/// Read a `{"$date": ...}` wrapper
pub fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    match map.get("$date")? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        // canonical form: {"$date": {"$numberLong": "..."}}
        Value::Object(inner) => {
            let millis = inner.get("$numberLong")?.as_str()?.parse::<i64>().ok()?;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

/// Flatten extended JSON wrappers for a response body
pub fn encode_response(value: Value) -> Value {
    if let Some(id) = as_object_id(&value) {
        return Value::String(id.to_hex());
    }
    if let Some(dt) = as_datetime(&value) {
        return Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(encode_response).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, encode_response(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_object_id_literal_shape() {
        assert!(is_object_id_literal("0123456789abcdef01234567"));
        assert!(!is_object_id_literal("0123456789ABCDEF01234567"));
        assert!(!is_object_id_literal("0123456789abcdef0123456"));
        assert!(!is_object_id_literal("0123456789abcdef0123456g"));
        assert!(parse_object_id("not-an-id").is_none());
    }

    #[test]
    fn test_oid_wrapper_roundtrip() {
        let id = ObjectId::new();
        assert_eq!(as_object_id(&oid_value(&id)), Some(id));
        assert_eq!(as_object_id(&json!({"$oid": "zz"})), None);
    }

    #[test]
    fn test_date_wrapper_forms() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(as_datetime(&date_value(&dt)), Some(dt));
        let millis = dt.timestamp_millis();
        assert_eq!(
            as_datetime(&json!({"$date": {"$numberLong": millis.to_string()}})),
            Some(dt)
        );
    }

    #[test]
    fn test_encode_response_flattens_nested() {
        let id = ObjectId::parse_str("0123456789abcdef01234567").unwrap();
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let doc = json!({
            "_id": oid_value(&id),
            "events": [{"at": date_value(&dt), "n": 1}]
        });
        assert_eq!(
            encode_response(doc),
            json!({
                "_id": "0123456789abcdef01234567",
                "events": [{"at": "2024-01-02T03:04:05.000Z", "n": 1}]
            })
        );
    }
}
