//! Document store seam
//!
//! The gateway never talks to a database directly. It drives an
//! implementation of `DocumentStore`, which exposes the Mongo-like
//! primitives below. Each method returns a boxed future so the engine can
//! race it against a timeout.

use std::future::Future;
use std::pin::Pin;

use bson::{Bson, Document};
use thiserror::Error;

/// Store-level failure; the message is surfaced to the caller verbatim
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Future returned by every store primitive
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Read shaping for `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
}

/// Acknowledgement of `insertOne`
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Bson,
    pub acknowledged: bool,
}

/// Acknowledgement of `updateOne` / `updateMany`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub acknowledged: bool,
}

/// Acknowledgement of `deleteOne` / `deleteMany`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
    pub acknowledged: bool,
}

/// Primitives the gateway dispatches to
pub trait DocumentStore: Send + Sync {
    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> StoreFuture<'a, Vec<Document>>;

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        projection: Option<Document>,
    ) -> StoreFuture<'a, Option<Document>>;

    fn count_documents<'a>(&'a self, collection: &'a str, filter: Document)
        -> StoreFuture<'a, u64>;

    fn aggregate<'a>(
        &'a self,
        collection: &'a str,
        pipeline: Vec<Document>,
    ) -> StoreFuture<'a, Vec<Document>>;

    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> StoreFuture<'a, InsertOneResult>;

    fn update_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> StoreFuture<'a, UpdateResult>;

    fn update_many<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> StoreFuture<'a, UpdateResult>;

    fn delete_one<'a>(&'a self, collection: &'a str, filter: Document)
        -> StoreFuture<'a, DeleteResult>;

    fn delete_many<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> StoreFuture<'a, DeleteResult>;
}
