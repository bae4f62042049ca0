//! Type Normalizer Tests
//!
//! Identifier and date promotion through the public API:
//! - `$oid` wrappers become the same ObjectId `parse_str` yields
//! - ISO date strings survive a round trip to the second
//! - Normalizing twice changes nothing
//! - Malformed identifiers and impossible dates are rejected

use bson::oid::ObjectId;
use bson::{doc, Bson};
use querygate::gateway::{
    looks_like_datetime, normalize, normalize_document, normalize_json, GatewayError,
};
use serde_json::json;

// =============================================================================
// Identifier Tests
// =============================================================================

#[test]
fn test_oid_wrapper_matches_parse_str() {
    for hex in [
        "65a1b2c3d4e5f60718293a4b",
        "000000000000000000000000",
        "ffffffffffffffffffffffff",
    ] {
        let promoted = normalize_json(&json!({"$oid": hex})).unwrap();
        assert_eq!(promoted, Bson::ObjectId(ObjectId::parse_str(hex).unwrap()));
    }
}

#[test]
fn test_oid_inside_operators_and_arrays() {
    let a = "65a1b2c3d4e5f60718293a4b";
    let b = "65a1b2c3d4e5f60718293a4c";
    let filter = normalize_document(
        &json!({"childId": {"$in": [{"$oid": a}, {"$oid": b}]}}),
        "filter",
    )
    .unwrap();

    let expected = doc! {
        "childId": { "$in": [ObjectId::parse_str(a).unwrap(), ObjectId::parse_str(b).unwrap()] }
    };
    assert_eq!(filter, expected);
}

#[test]
fn test_malformed_oid_rejected() {
    for bad in ["xyz", "65a1b2c3d4e5f60718293a4", "65a1b2c3d4e5f60718293a4bz"] {
        let err = normalize_json(&json!({"$oid": bad})).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidObjectId(_)));
    }
}

// =============================================================================
// Date Tests
// =============================================================================

#[test]
fn test_iso_dates_round_trip_to_the_second() {
    let cases = [
        ("2024-05-01T00:00:00Z", 1_714_521_600_000),
        ("2024-05-01T00:00:00", 1_714_521_600_000),
        ("2024-05-01T00:00:00.750Z", 1_714_521_600_750),
        ("2024-05-01T02:00:00+02:00", 1_714_521_600_000),
    ];
    for (input, millis) in cases {
        match normalize_json(&json!(input)).unwrap() {
            Bson::DateTime(dt) => assert_eq!(dt.timestamp_millis(), millis, "{}", input),
            other => panic!("{} became {:?}", input, other),
        }
    }
}

#[test]
fn test_non_dates_left_alone() {
    for s in ["2024-05-01", "2024-05", "May 1st 2024", "T12:00:00", "x2024-05-01T00:00:00"] {
        assert!(!looks_like_datetime(s));
        assert_eq!(normalize_json(&json!(s)).unwrap(), Bson::String(s.to_string()));
    }
}

#[test]
fn test_impossible_date_rejected() {
    let err = normalize_json(&json!({"from": "2024-02-30T00:00:00Z"})).unwrap_err();
    assert!(matches!(err, GatewayError::InvalidDate(_)));
}

// =============================================================================
// Idempotence Tests
// =============================================================================

#[test]
fn test_normalize_is_idempotent() {
    let input = json!({
        "_id": {"$oid": "65a1b2c3d4e5f60718293a4b"},
        "date": {"$gte": "2024-05-01T00:00:00Z", "$lt": {"$date": "2024-06-01T00:00:00Z"}},
        "tags": ["a", {"b": "2024-01-01T10:00:00"}],
        "n": 5,
        "big": 9_007_199_254_740_993i64,
        "ratio": 0.5,
        "ok": true,
        "none": null
    });

    let once = normalize_json(&input).unwrap();
    let twice = normalize(once.clone()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_plain_values_unchanged() {
    let input = json!({"name": "Mia", "age": 4, "group": {"name": "sun"}, "list": [1, 2]});
    let out = normalize_document(&input, "document").unwrap();
    assert_eq!(
        out,
        doc! { "name": "Mia", "age": 4, "group": { "name": "sun" }, "list": [1, 2] }
    );
}

#[test]
fn test_non_object_rejected_as_document() {
    let err = normalize_document(&json!([1, 2]), "filter").unwrap_err();
    assert_eq!(err.code(), "GATEWAY_INVALID_REQUEST");
}
