//! String coercions for leaf types that have no native JSON form

use super::FieldType;
use crate::core::json::{date_value, oid_value};
use bson::oid::ObjectId;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;

/// Datetime layouts accepted on input, tried in order
pub const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Coerce a raw value towards the field's declared types
///
/// Only strings are coerced, and only when `string` itself is not an
/// accepted type. Everything else is returned unchanged for the type check.
pub fn coerce(types: &[FieldType], value: Value) -> Result<Value, String> {
    let Value::String(raw) = &value else {
        return Ok(value);
    };
    if types.contains(&FieldType::String) {
        return Ok(value);
    }

    if types.contains(&FieldType::ObjectId) {
        if let Ok(id) = ObjectId::parse_str(raw) {
            return Ok(oid_value(&id));
        }
    }
    if types.contains(&FieldType::DateTime) {
        if let Some(dt) = parse_datetime(raw) {
            return Ok(date_value(&dt));
        }
    }
    if types.contains(&FieldType::Date) {
        if let Some(dt) = parse_date(raw) {
            return Ok(date_value(&dt));
        }
    }

    let coercible: Vec<&str> = types
        .iter()
        .filter(|t| matches!(t, FieldType::ObjectId | FieldType::Date | FieldType::DateTime))
        .map(FieldType::name)
        .collect();
    if coercible.is_empty() {
        Ok(value)
    } else {
        Err(format!("cannot coerce '{}' to {}", raw, coercible.join(" or ")))
    }
}

pub fn parse_datetime(raw: &str) -> Option<chrono::DateTime<Utc>> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn parse_date(raw: &str) -> Option<chrono::DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_objectid_coercion() {
        let coerced = coerce(&[FieldType::ObjectId], json!("0123456789abcdef01234567")).unwrap();
        assert_eq!(coerced, json!({"$oid": "0123456789abcdef01234567"}));
        assert!(coerce(&[FieldType::ObjectId], json!("nope")).is_err());
    }

    #[test]
    fn test_date_coercion_is_midnight_utc() {
        let coerced = coerce(&[FieldType::Date], json!("2024-02-29")).unwrap();
        assert_eq!(coerced, json!({"$date": "2024-02-29T00:00:00.000Z"}));
        assert!(coerce(&[FieldType::Date], json!("29/02/2024")).is_err());
    }

    #[test]
    fn test_datetime_formats_in_order() {
        for raw in [
            "2024-05-01T10:20:30.250",
            "2024-05-01 10:20:30.250",
            "2024-05-01T10:20:30",
            "2024-05-01 10:20:30",
        ] {
            assert!(parse_datetime(raw).is_some(), "{raw} should parse");
        }
        let coerced = coerce(&[FieldType::DateTime], json!("2024-05-01 10:20:30.250")).unwrap();
        assert_eq!(coerced, json!({"$date": "2024-05-01T10:20:30.250Z"}));
        assert!(coerce(&[FieldType::DateTime], json!("yesterday")).is_err());
    }

    #[test]
    fn test_string_type_disables_coercion() {
        let raw = json!("0123456789abcdef01234567");
        assert_eq!(
            coerce(&[FieldType::String, FieldType::ObjectId], raw.clone()).unwrap(),
            raw
        );
        assert_eq!(coerce(&[FieldType::Integer], json!("12")).unwrap(), json!("12"));
        assert_eq!(coerce(&[FieldType::ObjectId], json!(5)).unwrap(), json!(5));
    }
}
