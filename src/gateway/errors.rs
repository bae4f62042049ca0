//! # Gateway Errors
//!
//! Every failure the gateway can produce. Nothing here escapes the gateway
//! boundary as an `Err`: the engine folds each variant into a failed
//! `QueryResult` carrying `code()` and the display message.

use thiserror::Error;

use super::store::StoreError;

/// Result type for gateway internals
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Broad failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any store access
    Validation,
    /// The store reported a failure
    Execution,
    /// The store did not answer within the timeout
    Timeout,
}

/// Gateway errors
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    // ==================
    // Validation
    // ==================
    /// Request body is not valid JSON or has the wrong shape
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Collection is not in the allow-list
    #[error("collection '{0}' is not allowed")]
    CollectionNotAllowed(String),

    /// Operation is unknown or disabled
    #[error("operation '{0}' is not allowed")]
    OperationNotAllowed(String),

    /// A forbidden operator key was found
    #[error("operator '{operator}' is forbidden (at {path})")]
    ForbiddenOperator { operator: String, path: String },

    /// A write stage inside an aggregation pipeline
    #[error("pipeline stage '{0}' is not allowed: aggregate is read-only")]
    ForbiddenStage(String),

    /// Field required by the operation is missing or empty
    #[error("{field} is required for {operation}")]
    MissingField {
        field: &'static str,
        operation: &'static str,
    },

    /// Delete without a filter
    #[error("filter is required for {0}: refusing to delete every document")]
    EmptyDeleteFilter(&'static str),

    /// Update document does not use operator shape
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// Limit is negative
    #[error("limit must not be negative, got {0}")]
    InvalidLimit(i64),

    /// `$oid` wrapper with a malformed hex string
    #[error("invalid ObjectId '{0}'")]
    InvalidObjectId(String),

    /// Date-shaped string that is not a real date-time
    #[error("invalid date '{0}'")]
    InvalidDate(String),

    // ==================
    // Execution
    // ==================
    /// Store-level failure
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Store call exceeded the timeout
    #[error("query timeout")]
    Timeout,
}

impl GatewayError {
    /// Failure category
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Store(_) => ErrorKind::Execution,
            GatewayError::Timeout => ErrorKind::Timeout,
            _ => ErrorKind::Validation,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "GATEWAY_INVALID_REQUEST",
            GatewayError::CollectionNotAllowed(_) => "GATEWAY_COLLECTION_NOT_ALLOWED",
            GatewayError::OperationNotAllowed(_) => "GATEWAY_OPERATION_NOT_ALLOWED",
            GatewayError::ForbiddenOperator { .. } => "GATEWAY_FORBIDDEN_OPERATOR",
            GatewayError::ForbiddenStage(_) => "GATEWAY_FORBIDDEN_STAGE",
            GatewayError::MissingField { .. } => "GATEWAY_MISSING_FIELD",
            GatewayError::EmptyDeleteFilter(_) => "GATEWAY_EMPTY_DELETE_FILTER",
            GatewayError::InvalidUpdate(_) => "GATEWAY_INVALID_UPDATE",
            GatewayError::InvalidLimit(_) => "GATEWAY_INVALID_LIMIT",
            GatewayError::InvalidObjectId(_) => "GATEWAY_INVALID_OBJECT_ID",
            GatewayError::InvalidDate(_) => "GATEWAY_INVALID_DATE",
            GatewayError::Store(_) => "GATEWAY_STORE_ERROR",
            GatewayError::Timeout => "GATEWAY_TIMEOUT",
        }
    }

    /// Whether this failure happened before the store was touched
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}
