//! Result Formatter
//!
//! One envelope for every operation so callers never branch on the kind.
//! Native BSON values in `data` are rendered as relaxed Extended JSON.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::GatewayError;
use super::store::{DeleteResult, InsertOneResult, UpdateResult};

/// Gateway response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl QueryResult {
    fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            count: None,
            message: None,
            error: None,
            code: None,
        }
    }

    /// `find` / `aggregate`
    pub fn documents(docs: Vec<Document>) -> Self {
        Self::ok(Value::Array(
            docs.into_iter()
                .map(|d| Bson::Document(d).into_relaxed_extjson())
                .collect(),
        ))
    }

    /// `findOne`; no match renders as `null`
    pub fn document(doc: Option<Document>) -> Self {
        Self::ok(
            doc.map(|d| Bson::Document(d).into_relaxed_extjson())
                .unwrap_or(Value::Null),
        )
    }

    /// `count` / `countDocuments`
    pub fn counted(n: u64) -> Self {
        Self {
            count: Some(n),
            ..Self::ok(json!(n))
        }
    }

    pub fn inserted(res: InsertOneResult) -> Self {
        Self {
            message: Some("record created".to_string()),
            ..Self::ok(json!({
                "insertedId": res.inserted_id.into_relaxed_extjson(),
                "acknowledged": res.acknowledged,
            }))
        }
    }

    pub fn updated(res: UpdateResult) -> Self {
        Self {
            message: Some(format!("{} records updated", res.modified_count)),
            ..Self::ok(json!({
                "matchedCount": res.matched_count,
                "modifiedCount": res.modified_count,
                "acknowledged": res.acknowledged,
            }))
        }
    }

    pub fn deleted(res: DeleteResult) -> Self {
        Self {
            message: Some(format!("{} records deleted", res.deleted_count)),
            ..Self::ok(json!({
                "deletedCount": res.deleted_count,
                "acknowledged": res.acknowledged,
            }))
        }
    }

    /// Successful result with arbitrary payload
    pub fn with_data(data: Value) -> Self {
        Self::ok(data)
    }

    pub fn failure(err: &GatewayError) -> Self {
        Self {
            success: false,
            data: None,
            count: None,
            message: None,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("QueryResult serialization cannot fail")
    }
}

impl From<GatewayError> for QueryResult {
    fn from(err: GatewayError) -> Self {
        Self::failure(&err)
    }
}
