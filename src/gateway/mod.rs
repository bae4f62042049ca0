//! Gated query execution gateway
//!
//! Turns an untrusted structured request into at most one call against a
//! document store:
//!
//! - `registry`: which collections and operation kinds are addressable
//! - `sanitizer`: deny-list of operator keys at any depth
//! - `normalizer`: `$oid` wrappers and ISO date strings to native BSON
//! - `engine`: validate, normalize, prepare, dispatch with a timeout
//! - `result`: the uniform response envelope
//!
//! The store itself sits behind the `DocumentStore` trait.

mod config;
mod engine;
mod errors;
mod memory;
mod normalizer;
mod operation;
mod registry;
mod request;
mod result;
mod sanitizer;
mod store;

pub use config::{ConfigError, GatewayConfig, DEFAULT_TIMEOUT_MS, MAX_LIMIT};
pub use engine::{
    effective_limit, stamp_insert, stamp_update, PreparedAction, PreparedQuery, QueryGateway,
};
pub use errors::{ErrorKind, GatewayError, GatewayResult};
pub use memory::{matches, MemoryStore};
pub use normalizer::{looks_like_datetime, normalize, normalize_document, normalize_json, to_bson};
pub use operation::{OperationCategory, OperationKind};
pub use registry::AllowList;
pub use request::QueryRequest;
pub use result::QueryResult;
pub use sanitizer::{OperatorSanitizer, Violation};
pub use store::{
    DeleteResult, DocumentStore, FindOptions, InsertOneResult, StoreError, StoreFuture,
    StoreResult, UpdateResult,
};
