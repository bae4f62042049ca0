//! Execution Engine
//!
//! Linear, no retries:
//!
//! 1. Validate: allow-list, per-operation required fields, operator deny-list
//! 2. Normalize: JSON to BSON with identifier/date promotion
//! 3. Prepare: clamp the limit, cap aggregation pipelines
//! 4. Dispatch: stamp audit fields on writes, call the store primitive
//! 5. Race: the store call against the configured timeout
//! 6. Shape: fold the store answer into a `QueryResult`
//!
//! Steps 1-3 never touch the store. Every error is converted into a failed
//! `QueryResult`; `execute` never returns `Err` and never panics on input.
//!
//! On timeout the store future is dropped, which cancels the client side of
//! the call at its next suspension point. A command the server has already
//! received may still run to completion there.

use std::sync::Arc;
use std::time::Instant;

use bson::{doc, Bson, Document};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::observability::{GatewayEvent, GatewayMetrics, MetricsSnapshot};

use super::config::GatewayConfig;
use super::errors::{GatewayError, GatewayResult};
use super::normalizer::{normalize_document, to_bson};
use super::operation::OperationKind;
use super::registry::AllowList;
use super::request::QueryRequest;
use super::result::QueryResult;
use super::sanitizer::OperatorSanitizer;
use super::store::{DocumentStore, FindOptions};

/// Aggregation stages that write to other collections
const WRITE_STAGES: [&str; 2] = ["$out", "$merge"];

/// A request that passed validation, ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub collection: String,
    pub kind: OperationKind,
    pub action: PreparedAction,
}

/// Store call with normalized arguments
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedAction {
    Find {
        filter: Document,
        options: FindOptions,
    },
    FindOne {
        filter: Document,
        projection: Option<Document>,
    },
    Count {
        filter: Document,
    },
    Aggregate {
        pipeline: Vec<Document>,
    },
    InsertOne {
        document: Document,
    },
    Update {
        filter: Document,
        update: Document,
        many: bool,
    },
    Delete {
        filter: Document,
        many: bool,
    },
}

impl PreparedQuery {
    /// Extended-JSON rendering of the prepared call, for dry runs
    pub fn plan(&self) -> Value {
        let ext = |d: &Document| Bson::Document(d.clone()).into_relaxed_extjson();
        let mut plan = json!({
            "collection": self.collection,
            "operation": self.kind.as_str(),
        });

        match &self.action {
            PreparedAction::Find { filter, options } => {
                plan["filter"] = ext(filter);
                plan["projection"] = options.projection.as_ref().map(ext).into();
                plan["sort"] = options.sort.as_ref().map(ext).into();
                plan["limit"] = options.limit.into();
            }
            PreparedAction::FindOne { filter, projection } => {
                plan["filter"] = ext(filter);
                plan["projection"] = projection.as_ref().map(ext).into();
            }
            PreparedAction::Count { filter } | PreparedAction::Delete { filter, .. } => {
                plan["filter"] = ext(filter);
            }
            PreparedAction::Aggregate { pipeline } => {
                plan["pipeline"] = Value::Array(pipeline.iter().map(ext).collect());
            }
            PreparedAction::InsertOne { document } => {
                plan["document"] = ext(document);
            }
            PreparedAction::Update { filter, update, .. } => {
                plan["filter"] = ext(filter);
                plan["update"] = ext(update);
            }
        }
        plan
    }
}

/// Effective row cap: absent or zero means `max`, larger values are
/// lowered to `max`, negative values are rejected.
pub fn effective_limit(requested: Option<i64>, max: i64) -> GatewayResult<i64> {
    match requested {
        None | Some(0) => Ok(max),
        Some(n) if n < 0 => Err(GatewayError::InvalidLimit(n)),
        Some(n) => Ok(n.min(max)),
    }
}

/// The gated query execution gateway
pub struct QueryGateway {
    store: Arc<dyn DocumentStore>,
    config: Arc<GatewayConfig>,
    allow_list: AllowList,
    sanitizer: OperatorSanitizer,
    metrics: Arc<GatewayMetrics>,
}

impl QueryGateway {
    /// Create a gateway over `store`
    pub fn new(store: Arc<dyn DocumentStore>, config: GatewayConfig) -> Self {
        let allow_list = AllowList::from_config(&config);
        let sanitizer = OperatorSanitizer::new(config.forbidden_operators.iter().cloned());

        info!(
            event = GatewayEvent::GatewayReady.as_str(),
            collections = config.collections.len(),
            operations = config.operations.len(),
            timeout_ms = config.timeout_ms,
            "gateway ready"
        );

        Self {
            store,
            config: Arc::new(config),
            allow_list,
            sanitizer,
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Allow-listed collection names, sorted
    pub fn collection_names(&self) -> Vec<&str> {
        self.allow_list.collection_names()
    }

    /// What the assistant may do, for tool descriptions
    pub fn capabilities(&self) -> Value {
        json!({
            "collections": self.allow_list.collection_names(),
            "operations": self
                .allow_list
                .operations()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>(),
            "maxLimit": self.config.max_limit,
            "timeoutMs": self.config.timeout_ms,
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Execute a raw JSON request
    pub async fn execute_json(&self, json: &str) -> QueryResult {
        match QueryRequest::parse(json) {
            Ok(request) => self.execute(request).await,
            Err(e) => {
                self.metrics.increment_requests();
                self.metrics.increment_rejected();
                warn!(
                    event = GatewayEvent::RequestRejected.as_str(),
                    code = e.code(),
                    error = %e,
                    "request rejected"
                );
                e.into()
            }
        }
    }

    /// Execute a request. Never fails: errors come back as
    /// `success: false` envelopes.
    pub async fn execute(&self, request: QueryRequest) -> QueryResult {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "query",
            %request_id,
            collection = %request.collection,
            operation = %request.operation,
        );

        async move {
            self.metrics.increment_requests();
            let started = Instant::now();
            debug!(event = GatewayEvent::RequestReceived.as_str(), "request received");

            let prepared = match self.prepare(&request) {
                Ok(p) => p,
                Err(e) => {
                    self.metrics.increment_rejected();
                    warn!(
                        event = GatewayEvent::RequestRejected.as_str(),
                        code = e.code(),
                        error = %e,
                        "request rejected"
                    );
                    return QueryResult::from(e);
                }
            };
            debug!(event = GatewayEvent::RequestPrepared.as_str(), "request prepared");

            let is_write = prepared.kind.is_write();
            match self.run(prepared).await {
                Ok(result) => {
                    self.metrics.increment_executed();
                    if is_write {
                        self.metrics.increment_writes();
                    }
                    info!(
                        event = GatewayEvent::RequestExecuted.as_str(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "request complete"
                    );
                    result
                }
                Err(GatewayError::Timeout) => {
                    self.metrics.increment_timed_out();
                    warn!(
                        event = GatewayEvent::RequestTimedOut.as_str(),
                        timeout_ms = self.config.timeout_ms,
                        "store call timed out"
                    );
                    QueryResult::from(GatewayError::Timeout)
                }
                Err(e) => {
                    self.metrics.increment_failed();
                    error!(
                        event = GatewayEvent::RequestFailed.as_str(),
                        code = e.code(),
                        error = %e,
                        "store call failed"
                    );
                    QueryResult::from(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Validate, normalize and prepare without touching the store
    pub fn check(&self, request: &QueryRequest) -> QueryResult {
        match self.prepare(request) {
            Ok(prepared) => QueryResult::with_data(prepared.plan()),
            Err(e) => e.into(),
        }
    }

    /// Steps 1-3
    pub fn prepare(&self, request: &QueryRequest) -> GatewayResult<PreparedQuery> {
        self.allow_list.check_collection(&request.collection)?;
        let kind = self.allow_list.check_operation(&request.operation)?;
        self.sanitize(request)?;

        let filter = match &request.filter {
            None | Some(Value::Null) => Document::new(),
            Some(v) => normalize_document(v, "filter")?,
        };

        let action = match kind {
            OperationKind::Find => PreparedAction::Find {
                filter,
                options: FindOptions {
                    projection: shape_document(request.projection.as_ref(), "projection")?,
                    sort: shape_document(request.sort.as_ref(), "sort")?,
                    limit: Some(effective_limit(request.limit, self.config.max_limit)?),
                },
            },
            OperationKind::FindOne => PreparedAction::FindOne {
                filter,
                projection: shape_document(request.projection.as_ref(), "projection")?,
            },
            OperationKind::Count | OperationKind::CountDocuments => {
                PreparedAction::Count { filter }
            }
            OperationKind::Aggregate => PreparedAction::Aggregate {
                pipeline: self.prepare_pipeline(request, kind)?,
            },
            OperationKind::InsertOne => {
                let document = match &request.document {
                    Some(v @ Value::Object(_)) => normalize_document(v, "document")?,
                    Some(Value::Null) | None => {
                        return Err(GatewayError::MissingField {
                            field: "document",
                            operation: kind.as_str(),
                        })
                    }
                    Some(_) => {
                        return Err(GatewayError::InvalidRequest(
                            "document must be an object".into(),
                        ))
                    }
                };
                PreparedAction::InsertOne { document }
            }
            OperationKind::UpdateOne | OperationKind::UpdateMany => {
                let update = match &request.update {
                    Some(v) if !v.is_null() => {
                        check_update_shape(v)?;
                        normalize_document(v, "update")?
                    }
                    _ => {
                        return Err(GatewayError::MissingField {
                            field: "update",
                            operation: kind.as_str(),
                        })
                    }
                };
                PreparedAction::Update {
                    filter,
                    update,
                    many: kind == OperationKind::UpdateMany,
                }
            }
            OperationKind::DeleteOne | OperationKind::DeleteMany => {
                if request.filter_is_empty() || filter.is_empty() {
                    return Err(GatewayError::EmptyDeleteFilter(kind.as_str()));
                }
                PreparedAction::Delete {
                    filter,
                    many: kind == OperationKind::DeleteMany,
                }
            }
        };

        Ok(PreparedQuery {
            collection: request.collection.clone(),
            kind,
            action,
        })
    }

    /// Deny-list every caller-controlled tree
    fn sanitize(&self, request: &QueryRequest) -> GatewayResult<()> {
        if let Some(filter) = &request.filter {
            self.sanitizer.check("filter", filter)?;
        }
        if let Some(pipeline) = &request.pipeline {
            for (i, stage) in pipeline.iter().enumerate() {
                self.sanitizer.check(&format!("pipeline.{}", i), stage)?;
            }
        }
        if let Some(document) = &request.document {
            self.sanitizer.check("document", document)?;
        }
        if let Some(update) = &request.update {
            self.sanitizer.check("update", update)?;
        }
        if let Some(projection) = &request.projection {
            self.sanitizer.check("projection", projection)?;
        }
        if let Some(sort) = &request.sort {
            self.sanitizer.check("sort", sort)?;
        }
        Ok(())
    }

    /// Normalize stages, refuse write stages, and cap the row count
    fn prepare_pipeline(
        &self,
        request: &QueryRequest,
        kind: OperationKind,
    ) -> GatewayResult<Vec<Document>> {
        let stages = match &request.pipeline {
            Some(stages) if !stages.is_empty() => stages,
            _ => {
                return Err(GatewayError::MissingField {
                    field: "pipeline",
                    operation: kind.as_str(),
                })
            }
        };

        let limit = effective_limit(request.limit, self.config.max_limit)?;
        let mut pipeline = Vec::with_capacity(stages.len() + 1);
        let mut has_limit = false;

        for stage in stages {
            let mut stage = normalize_document(stage, "pipeline stage")?;
            if let Some(name) = stage.keys().find(|k| WRITE_STAGES.contains(&k.as_str())) {
                return Err(GatewayError::ForbiddenStage(name.clone()));
            }
            self.allow_list.check_stage_sources(&stage)?;
            if let Some(value) = stage.get("$limit") {
                has_limit = true;
                if bson_as_f64(value).is_some_and(|n| n > self.config.max_limit as f64) {
                    stage.insert("$limit", self.config.max_limit);
                }
            }
            pipeline.push(stage);
        }

        if !has_limit {
            pipeline.push(doc! { "$limit": limit });
        }
        Ok(pipeline)
    }

    /// Steps 4-6
    async fn run(&self, prepared: PreparedQuery) -> GatewayResult<QueryResult> {
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, dispatch(self.store.as_ref(), prepared)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(GatewayError::Timeout),
        }
    }
}

/// Call the store primitive for a prepared query and shape its answer
async fn dispatch(store: &dyn DocumentStore, prepared: PreparedQuery) -> GatewayResult<QueryResult> {
    let PreparedQuery {
        collection, action, ..
    } = prepared;
    let collection = collection.as_str();

    let result = match action {
        PreparedAction::Find { filter, options } => {
            QueryResult::documents(store.find(collection, filter, options).await?)
        }
        PreparedAction::FindOne { filter, projection } => {
            QueryResult::document(store.find_one(collection, filter, projection).await?)
        }
        PreparedAction::Count { filter } => {
            QueryResult::counted(store.count_documents(collection, filter).await?)
        }
        PreparedAction::Aggregate { pipeline } => {
            QueryResult::documents(store.aggregate(collection, pipeline).await?)
        }
        PreparedAction::InsertOne { document } => {
            let document = stamp_insert(document, bson::DateTime::now());
            QueryResult::inserted(store.insert_one(collection, document).await?)
        }
        PreparedAction::Update {
            filter,
            update,
            many,
        } => {
            let update = stamp_update(update, bson::DateTime::now());
            let res = if many {
                store.update_many(collection, filter, update).await?
            } else {
                store.update_one(collection, filter, update).await?
            };
            QueryResult::updated(res)
        }
        PreparedAction::Delete { filter, many } => {
            let res = if many {
                store.delete_many(collection, filter).await?
            } else {
                store.delete_one(collection, filter).await?
            };
            QueryResult::deleted(res)
        }
    };
    Ok(result)
}

/// `createdAt` and `updatedAt` on new records, overwriting caller values
pub fn stamp_insert(mut document: Document, now: bson::DateTime) -> Document {
    document.insert("createdAt", now);
    document.insert("updatedAt", now);
    document
}

/// `updatedAt` merged into `$set`, synthesizing `$set` when absent
pub fn stamp_update(mut update: Document, now: bson::DateTime) -> Document {
    match update.get_mut("$set") {
        Some(Bson::Document(set)) => {
            set.insert("updatedAt", now);
        }
        _ => {
            update.insert("$set", doc! { "updatedAt": now });
        }
    }
    update
}

/// Update must be a non-empty object of `$` operators with an object `$set`
fn check_update_shape(update: &Value) -> GatewayResult<()> {
    let map = update
        .as_object()
        .ok_or_else(|| GatewayError::InvalidUpdate("update must be an object".into()))?;

    if map.is_empty() {
        return Err(GatewayError::InvalidUpdate("update must not be empty".into()));
    }
    if let Some(key) = map.keys().find(|k| !k.starts_with('$')) {
        return Err(GatewayError::InvalidUpdate(format!(
            "field '{}' must be wrapped in an update operator such as $set",
            key
        )));
    }
    if let Some(set) = map.get("$set") {
        if !set.is_object() {
            return Err(GatewayError::InvalidUpdate("$set must be an object".into()));
        }
    }
    Ok(())
}

/// Projection and sort: plain conversion, must be an object
fn shape_document(value: Option<&Value>, field: &str) -> GatewayResult<Option<Document>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match to_bson(v) {
            Bson::Document(doc) => Ok(Some(doc)),
            _ => Err(GatewayError::InvalidRequest(format!(
                "{} must be an object",
                field
            ))),
        },
    }
}

fn bson_as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}
