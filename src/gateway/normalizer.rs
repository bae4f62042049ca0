//! Type Normalizer
//!
//! Requests arrive as plain JSON but the store compares identifiers and
//! dates as native BSON values. This module converts the JSON tree into
//! BSON and then promotes:
//!
//! - `{"$oid": "<24 hex chars>"}` to `Bson::ObjectId`
//! - `{"$date": "<iso>"}` or `{"$date": <millis>}` to `Bson::DateTime`
//! - any string starting with `YYYY-MM-DDTHH:MM:SS` to `Bson::DateTime`
//!
//! Date-shaped strings are always promoted; there is no way to keep one as a
//! literal string. Offset-less date-times are read as UTC.
//!
//! The promotion pass works on BSON, so running it over its own output
//! changes nothing.

use std::sync::LazyLock;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

use super::errors::{GatewayError, GatewayResult};

static ISO_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?")
        .expect("ISO prefix pattern is valid")
});

/// Whether `s` starts like an ISO-8601 date-time
pub fn looks_like_datetime(s: &str) -> bool {
    ISO_PREFIX.is_match(s)
}

/// Plain structural conversion, no promotion
pub fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(small) => Bson::Int32(small),
                    Err(_) => Bson::Int64(i),
                }
            } else if let Some(u) = n.as_u64() {
                // above i64::MAX, only representable as a double
                Bson::Double(u as f64)
            } else {
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        Value::Object(map) => {
            let mut doc = Document::new();
            for (k, v) in map {
                doc.insert(k.clone(), to_bson(v));
            }
            Bson::Document(doc)
        }
    }
}

/// Promote identifier wrappers and date strings anywhere in `value`
pub fn normalize(value: Bson) -> GatewayResult<Bson> {
    match value {
        Bson::Document(doc) => {
            if let Some(promoted) = promote_wrapper(&doc)? {
                return Ok(promoted);
            }
            let mut out = Document::new();
            for (k, v) in doc {
                out.insert(k, normalize(v)?);
            }
            Ok(Bson::Document(out))
        }
        Bson::Array(items) => items
            .into_iter()
            .map(normalize)
            .collect::<GatewayResult<Vec<_>>>()
            .map(Bson::Array),
        Bson::String(s) if looks_like_datetime(&s) => parse_datetime(&s).map(Bson::DateTime),
        other => Ok(other),
    }
}

/// Convert and promote a JSON value
pub fn normalize_json(value: &Value) -> GatewayResult<Bson> {
    normalize(to_bson(value))
}

/// Convert and promote a JSON object; `field` names it in errors
pub fn normalize_document(value: &Value, field: &str) -> GatewayResult<Document> {
    match normalize_json(value)? {
        Bson::Document(doc) => Ok(doc),
        _ => Err(GatewayError::InvalidRequest(format!(
            "{} must be an object",
            field
        ))),
    }
}

/// Single-key `$oid` / `$date` wrappers
fn promote_wrapper(doc: &Document) -> GatewayResult<Option<Bson>> {
    if doc.len() != 1 {
        return Ok(None);
    }
    match (doc.get("$oid"), doc.get("$date")) {
        (Some(Bson::String(hex)), _) => ObjectId::parse_str(hex)
            .map(|oid| Some(Bson::ObjectId(oid)))
            .map_err(|_| GatewayError::InvalidObjectId(hex.clone())),
        (_, Some(Bson::String(s))) => parse_datetime(s).map(|d| Some(Bson::DateTime(d))),
        (_, Some(Bson::Int64(ms))) => Ok(Some(Bson::DateTime(bson::DateTime::from_millis(*ms)))),
        (_, Some(Bson::Int32(ms))) => Ok(Some(Bson::DateTime(bson::DateTime::from_millis(
            i64::from(*ms),
        )))),
        _ => Ok(None),
    }
}

/// Parse an ISO-8601 date-time. A full RFC 3339 string keeps its offset;
/// otherwise the `YYYY-MM-DDTHH:MM:SS[.fff]` prefix is read as UTC.
fn parse_datetime(s: &str) -> GatewayResult<bson::DateTime> {
    let parsed: Option<DateTime<Utc>> = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            let prefix = ISO_PREFIX.find(s)?.as_str();
            NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        });

    parsed
        .map(|dt| bson::DateTime::from_millis(dt.timestamp_millis()))
        .ok_or_else(|| GatewayError::InvalidDate(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    fn iso_seconds(dt: &bson::DateTime) -> String {
        DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis())
            .unwrap()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    #[test]
    fn test_structural_conversion() {
        let b = to_bson(&json!({"a": 1, "b": 5_000_000_000i64, "c": 1.5, "d": [true, null]}));
        assert_eq!(
            b,
            Bson::Document(doc! {
                "a": 1i32,
                "b": 5_000_000_000i64,
                "c": 1.5,
                "d": [true, Bson::Null],
            })
        );
    }

    #[test]
    fn test_oid_wrapper_promoted() {
        let hex = "65a1b2c3d4e5f60718293a4b";
        let out = normalize_json(&json!({"childId": {"$oid": hex}})).unwrap();
        let expected = ObjectId::parse_str(hex).unwrap();
        assert_eq!(out, Bson::Document(doc! {"childId": expected}));
    }

    #[test]
    fn test_bad_oid_rejected() {
        let err = normalize_json(&json!({"_id": {"$oid": "not-hex"}})).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidObjectId(_)));
    }

    #[test]
    fn test_oid_key_among_others_is_not_a_wrapper() {
        let out = normalize_json(&json!({"x": {"$oid": "abc", "other": 1}})).unwrap();
        assert_eq!(out, Bson::Document(doc! {"x": {"$oid": "abc", "other": 1}}));
    }

    #[test]
    fn test_date_string_promoted() {
        let out = normalize_json(&json!({"date": {"$gte": "2024-03-01T00:00:00"}})).unwrap();
        let inner = out.as_document().unwrap().get_document("date").unwrap();
        match inner.get("$gte").unwrap() {
            Bson::DateTime(dt) => assert_eq!(iso_seconds(dt), "2024-03-01T00:00:00"),
            other => panic!("expected DateTime, got {:?}", other),
        }
    }

    #[test]
    fn test_date_with_offset_and_millis() {
        let out = normalize_json(&json!("2024-03-01T10:00:00.250+03:00")).unwrap();
        match out {
            Bson::DateTime(dt) => {
                assert_eq!(iso_seconds(&dt), "2024-03-01T07:00:00");
                assert_eq!(dt.timestamp_millis() % 1000, 250);
            }
            other => panic!("expected DateTime, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_dates_and_text_untouched() {
        let value = json!({"day": "2024-03-01", "note": "see 2024-03-01T10:00:00", "n": 3});
        let out = normalize_json(&value).unwrap();
        assert_eq!(out, to_bson(&value));
    }

    #[test]
    fn test_impossible_date_rejected() {
        let err = normalize_json(&json!("2024-13-45T99:00:00")).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidDate(_)));
    }

    #[test]
    fn test_date_wrapper() {
        let out = normalize_json(&json!({"$date": "2024-01-01T00:00:00Z"})).unwrap();
        assert!(matches!(out, Bson::DateTime(_)));
        let out = normalize_json(&json!({"$date": 0})).unwrap();
        assert_eq!(out, Bson::DateTime(bson::DateTime::from_millis(0)));
    }

    #[test]
    fn test_arrays_are_mapped() {
        let out = normalize_json(&json!([{"$oid": "65a1b2c3d4e5f60718293a4b"}, "2024-01-01T08:30:00"]))
            .unwrap();
        let items = out.as_array().unwrap();
        assert!(matches!(items[0], Bson::ObjectId(_)));
        assert!(matches!(items[1], Bson::DateTime(_)));
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_json(&json!({
            "a": {"$oid": "65a1b2c3d4e5f60718293a4b"},
            "b": ["2024-01-01T08:30:00", {"c": "2020-02-29T23:59:59Z"}],
            "d": "text"
        }))
        .unwrap();
        let twice = normalize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_document_requires_object() {
        assert!(normalize_document(&json!([1]), "document").is_err());
        assert!(normalize_document(&json!({"a": 1}), "document").is_ok());
    }
}
