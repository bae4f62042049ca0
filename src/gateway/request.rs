//! Gateway request
//!
//! Caller-supplied and untrusted. Every field except `collection` and
//! `operation` is optional; which ones are required depends on the
//! operation and is checked by the engine.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use super::errors::{GatewayError, GatewayResult};

/// Structured request produced by the assistant's tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub collection: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "integral_limit"
    )]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
}

impl QueryRequest {
    pub fn new(collection: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Parse a request from a JSON string
    pub fn parse(json: &str) -> GatewayResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| GatewayError::InvalidRequest(format!("Invalid JSON: {}", e)))
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Vec<Value>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_document(mut self, document: Value) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_update(mut self, update: Value) -> Self {
        self.update = Some(update);
        self
    }

    /// True when `filter` is absent, null, or an empty object
    pub fn filter_is_empty(&self) -> bool {
        match &self.filter {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }
}

/// Accepts `10` and `10.0`; fractional limits are rejected.
/// Integral floats beyond the i64 range saturate and are clamped later.
fn integral_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let Some(n) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(i) = n.as_i64() {
        return Ok(Some(i));
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 => Ok(Some(f as i64)),
        _ => Err(D::Error::custom(format!("limit must be an integer, got {}", n))),
    }
}
