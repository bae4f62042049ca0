//! In-memory document store
//!
//! A `DocumentStore` over `HashMap<collection, Vec<Document>>` understanding
//! the common subset of the Mongo dialect:
//!
//! - filters: equality (with array membership), `$eq $ne $gt $gte $lt $lte
//!   $in $nin $exists`, `$and $or $nor`, dotted paths
//! - updates: `$set $unset $inc`
//! - pipeline stages: `$match $sort $skip $limit $project $count $group`
//!   (`$group` accumulators: `$sum $avg $min $max`)
//!
//! Anything else is a `StoreError`. Operations apply immediately; an optional
//! latency only delays the answer, so a caller that gives up early still
//! leaves the write in place.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::RwLock;
use std::time::Duration;

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use serde_json::Value;

use super::normalizer::normalize_json;
use super::store::{
    DeleteResult, DocumentStore, FindOptions, InsertOneResult, StoreError, StoreFuture,
    StoreResult, UpdateResult,
};

/// In-memory store for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Vec<Document>>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every answer by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed from `{ "<collection>": [ {doc}, ... ] }`, promoting `$oid`
    /// wrappers and date strings the same way requests are normalized.
    pub fn from_json(seed: &Value) -> StoreResult<Self> {
        let collections = seed
            .as_object()
            .ok_or_else(|| StoreError::new("seed must be an object of collections"))?;

        let store = Self::new();
        for (name, docs) in collections {
            let docs = docs.as_array().ok_or_else(|| {
                StoreError::new(format!("seed collection '{}' must be an array", name))
            })?;
            let mut parsed = Vec::with_capacity(docs.len());
            for doc in docs {
                match normalize_json(doc).map_err(|e| StoreError::new(e.to_string()))? {
                    Bson::Document(d) => parsed.push(d),
                    _ => {
                        return Err(StoreError::new(format!(
                            "seed collection '{}' must contain objects",
                            name
                        )))
                    }
                }
            }
            store.seed(name, parsed);
        }
        Ok(store)
    }

    /// Append documents, assigning an ObjectId `_id` where missing
    pub fn seed(&self, collection: &str, docs: impl IntoIterator<Item = Document>) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        let coll = data.entry(collection.to_string()).or_default();
        for mut doc in docs {
            if !doc.contains_key("_id") {
                doc.insert("_id", ObjectId::new());
            }
            coll.push(doc);
        }
    }

    /// Copy of a collection's documents in insertion order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        data.get(collection).cloned().unwrap_or_default()
    }

    /// Number of store primitives invoked so far
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    fn respond<T: Send + 'static>(&self, result: StoreResult<T>) -> StoreFuture<'_, T> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }

    fn read<T>(&self, collection: &str, f: impl FnOnce(&[Document]) -> StoreResult<T>) -> StoreResult<T> {
        let data = self
            .data
            .read()
            .map_err(|e| StoreError::new(format!("store lock poisoned: {}", e)))?;
        f(data.get(collection).map(Vec::as_slice).unwrap_or(&[]))
    }

    fn write<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Vec<Document>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StoreError::new(format!("store lock poisoned: {}", e)))?;
        f(data.entry(collection.to_string()).or_default())
    }

    fn update(&self, collection: &str, filter: &Document, update: &Document, many: bool) -> StoreResult<UpdateResult> {
        self.write(collection, |docs| {
            let mut matched = 0;
            let mut modified = 0;
            for doc in docs.iter_mut() {
                if !matches(doc, filter)? {
                    continue;
                }
                matched += 1;
                let mut next = doc.clone();
                if apply_update(&mut next, update)? {
                    *doc = next;
                    modified += 1;
                }
                if !many {
                    break;
                }
            }
            Ok(UpdateResult {
                matched_count: matched,
                modified_count: modified,
                acknowledged: true,
            })
        })
    }

    fn delete(&self, collection: &str, filter: &Document, many: bool) -> StoreResult<DeleteResult> {
        self.write(collection, |docs| {
            let mut doomed = Vec::new();
            for (i, doc) in docs.iter().enumerate() {
                if matches(doc, filter)? {
                    doomed.push(i);
                    if !many {
                        break;
                    }
                }
            }
            for &i in doomed.iter().rev() {
                docs.remove(i);
            }
            Ok(DeleteResult {
                deleted_count: doomed.len() as u64,
                acknowledged: true,
            })
        })
    }
}

impl DocumentStore for MemoryStore {
    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> StoreFuture<'a, Vec<Document>> {
        let result = self.read(collection, |docs| {
            let mut found = select(docs, &filter)?;
            if let Some(sort) = &options.sort {
                sort_documents(&mut found, sort);
            }
            if let Some(limit) = options.limit.filter(|n| *n > 0) {
                found.truncate(limit as usize);
            }
            if let Some(projection) = &options.projection {
                found = found.iter().map(|d| project(d, projection)).collect();
            }
            Ok(found)
        });
        self.respond(result)
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        projection: Option<Document>,
    ) -> StoreFuture<'a, Option<Document>> {
        let result = self.read(collection, |docs| {
            for doc in docs {
                if matches(doc, &filter)? {
                    return Ok(Some(match &projection {
                        Some(p) => project(doc, p),
                        None => doc.clone(),
                    }));
                }
            }
            Ok(None)
        });
        self.respond(result)
    }

    fn count_documents<'a>(&'a self, collection: &'a str, filter: Document) -> StoreFuture<'a, u64> {
        let result = self.read(collection, |docs| {
            let mut n = 0;
            for doc in docs {
                if matches(doc, &filter)? {
                    n += 1;
                }
            }
            Ok(n)
        });
        self.respond(result)
    }

    fn aggregate<'a>(
        &'a self,
        collection: &'a str,
        pipeline: Vec<Document>,
    ) -> StoreFuture<'a, Vec<Document>> {
        let result = self.read(collection, |docs| run_pipeline(docs.to_vec(), &pipeline));
        self.respond(result)
    }

    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        mut document: Document,
    ) -> StoreFuture<'a, InsertOneResult> {
        let result = self.write(collection, |docs| {
            let id = match document.get("_id") {
                Some(id) => id.clone(),
                None => {
                    let id = Bson::ObjectId(ObjectId::new());
                    document.insert("_id", id.clone());
                    id
                }
            };
            if docs.iter().any(|d| d.get("_id") == Some(&id)) {
                return Err(StoreError::new(format!("duplicate key: _id {}", id)));
            }
            docs.push(document);
            Ok(InsertOneResult {
                inserted_id: id,
                acknowledged: true,
            })
        });
        self.respond(result)
    }

    fn update_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> StoreFuture<'a, UpdateResult> {
        let result = self.update(collection, &filter, &update, false);
        self.respond(result)
    }

    fn update_many<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> StoreFuture<'a, UpdateResult> {
        let result = self.update(collection, &filter, &update, true);
        self.respond(result)
    }

    fn delete_one<'a>(&'a self, collection: &'a str, filter: Document) -> StoreFuture<'a, DeleteResult> {
        let result = self.delete(collection, &filter, false);
        self.respond(result)
    }

    fn delete_many<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> StoreFuture<'a, DeleteResult> {
        let result = self.delete(collection, &filter, true);
        self.respond(result)
    }
}

// =============================================================================
// Filters
// =============================================================================

fn select(docs: &[Document], filter: &Document) -> StoreResult<Vec<Document>> {
    let mut out = Vec::new();
    for doc in docs {
        if matches(doc, filter)? {
            out.push(doc.clone());
        }
    }
    Ok(out)
}

/// Resolve a dotted path
fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(d) => d.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether `doc` satisfies `filter`
pub fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => all_of(doc, cond)?.iter().all(|b| *b),
            "$or" => all_of(doc, cond)?.iter().any(|b| *b),
            "$nor" => !all_of(doc, cond)?.iter().any(|b| *b),
            op if op.starts_with('$') => {
                return Err(StoreError::new(format!("unsupported query operator '{}'", op)))
            }
            path => match_field(get_path(doc, path), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_of(doc: &Document, branches: &Bson) -> StoreResult<Vec<bool>> {
    let branches = branches
        .as_array()
        .ok_or_else(|| StoreError::new("logical operator expects an array"))?;
    branches
        .iter()
        .map(|b| match b {
            Bson::Document(f) => matches(doc, f),
            _ => Err(StoreError::new("logical operator expects an array of objects")),
        })
        .collect()
}

fn is_operator_doc(cond: &Bson) -> Option<&Document> {
    match cond {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn match_field(value: Option<&Bson>, cond: &Bson) -> StoreResult<bool> {
    let Some(ops) = is_operator_doc(cond) else {
        return Ok(equals(value, cond));
    };

    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$gt" => compares(value, arg, |o| o == Ordering::Greater),
            "$gte" => compares(value, arg, |o| o != Ordering::Less),
            "$lt" => compares(value, arg, |o| o == Ordering::Less),
            "$lte" => compares(value, arg, |o| o != Ordering::Greater),
            "$in" => in_list(value, arg)?,
            "$nin" => !in_list(value, arg)?,
            "$exists" => value.is_some() == truthy(arg),
            other => {
                return Err(StoreError::new(format!(
                    "unsupported query operator '{}'",
                    other
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array-membership semantics; missing matches `null`
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| bson_eq(item, target))
        }
        Some(v) => bson_eq(v, target),
    }
}

fn compares(value: Option<&Bson>, target: &Bson, pred: impl Fn(Ordering) -> bool) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare(item, target).is_some_and(&pred)),
        Some(v) => compare(v, target).is_some_and(pred),
    }
}

fn in_list(value: Option<&Bson>, list: &Bson) -> StoreResult<bool> {
    let list = list
        .as_array()
        .ok_or_else(|| StoreError::new("$in/$nin expects an array"))?;
    Ok(list.iter().any(|target| equals(value, target)))
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).map_or(true, |n| n != 0.0),
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering between comparable values of the same family
fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

// =============================================================================
// Updates
// =============================================================================

/// Apply an update document; returns whether `doc` changed
fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    let before = doc.clone();
    for (op, fields) in update {
        let fields = match fields {
            Bson::Document(f) => f,
            _ => return Err(StoreError::new(format!("{} expects an object", op))),
        };
        for (path, value) in fields {
            match op.as_str() {
                "$set" => set_path(doc, path, value.clone())?,
                "$unset" => unset_path(doc, path),
                "$inc" => {
                    let next = increment(get_path(doc, path), value, path)?;
                    set_path(doc, path, next)?;
                }
                other => {
                    return Err(StoreError::new(format!(
                        "unsupported update operator '{}'",
                        other
                    )))
                }
            }
        }
    }
    Ok(*doc != before)
}

/// `$inc` arithmetic. Int32 overflow widens to Int64; Int64 overflow is an error.
fn increment(current: Option<&Bson>, delta: &Bson, path: &str) -> StoreResult<Bson> {
    if as_f64(delta).is_none() {
        return Err(StoreError::new("$inc expects a number"));
    }
    let Some(current) = current else {
        return Ok(delta.clone());
    };
    let overflow = || StoreError::new(format!("$inc overflows 64-bit field '{}'", path));

    match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(match a.checked_add(*b) {
            Some(n) => Bson::Int32(n),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        }),
        (Bson::Int32(a), Bson::Int64(b)) => i64::from(*a)
            .checked_add(*b)
            .map(Bson::Int64)
            .ok_or_else(overflow),
        (Bson::Int64(a), Bson::Int32(b)) => a
            .checked_add(i64::from(*b))
            .map(Bson::Int64)
            .ok_or_else(overflow),
        (Bson::Int64(a), Bson::Int64(b)) => a.checked_add(*b).map(Bson::Int64).ok_or_else(overflow),
        _ => match (as_f64(current), as_f64(delta)) {
            (Some(x), Some(y)) => Ok(Bson::Double(x + y)),
            _ => Err(StoreError::new(format!(
                "cannot $inc non-numeric field '{}'",
                path
            ))),
        },
    }
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(child)) => set_path(child, rest, value),
                _ => Err(StoreError::new(format!(
                    "cannot create field '{}' inside a non-object",
                    path
                ))),
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}

// =============================================================================
// Shaping
// =============================================================================

/// Inclusion or exclusion projection over top-level fields
fn project(doc: &Document, projection: &Document) -> Document {
    let include_id = projection.get("_id").map_or(true, truthy);
    let inclusive = projection
        .iter()
        .any(|(k, v)| k != "_id" && truthy(v));

    let mut out = Document::new();
    for (key, value) in doc {
        let keep = if key == "_id" {
            include_id
        } else if inclusive {
            projection.get(key).is_some_and(truthy)
        } else {
            projection.get(key).map_or(true, |v| truthy(v))
        };
        if keep {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// Rank of a value's type in sort order, following Mongo's
/// null < numbers < strings < objects < arrays < ObjectId < bool < date
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 1,
        Bson::String(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::ObjectId(_) => 6,
        Bson::Boolean(_) => 7,
        Bson::DateTime(_) => 8,
        Bson::Timestamp(_) => 9,
        _ => 10,
    }
}

/// Total order for sorting: by type rank, then by value within a type
fn sort_cmp(a: &Bson, b: &Bson) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => compare(a, b).unwrap_or(Ordering::Equal),
    })
}

fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (field, dir) in sort {
            let ord = match (get_path(a, field), get_path(b, field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => sort_cmp(x, y),
            };
            let ord = if as_f64(dir).is_some_and(|d| d < 0.0) {
                ord.reverse()
            } else {
                ord
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

// =============================================================================
// Aggregation
// =============================================================================

fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let (name, spec) = match stage.iter().next() {
            Some(entry) if stage.len() == 1 => entry,
            _ => return Err(StoreError::new("pipeline stage must have exactly one field")),
        };
        docs = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => select(&docs, filter)?,
            ("$sort", Bson::Document(sort)) => {
                sort_documents(&mut docs, sort);
                docs
            }
            ("$skip", n) => {
                let n = as_f64(n).ok_or_else(|| StoreError::new("$skip expects a number"))?;
                docs.into_iter().skip(n.max(0.0) as usize).collect()
            }
            ("$limit", n) => {
                let n = as_f64(n)
                    .filter(|n| *n > 0.0)
                    .ok_or_else(|| StoreError::new("$limit expects a positive number"))?;
                docs.truncate(n as usize);
                docs
            }
            ("$project", Bson::Document(projection)) => {
                docs.iter().map(|d| project(d, projection)).collect()
            }
            ("$count", Bson::String(field)) => {
                let mut counted = Document::new();
                counted.insert(field.clone(), docs.len() as i64);
                vec![counted]
            }
            ("$group", Bson::Document(spec)) => group(&docs, spec)?,
            (other, _) => {
                return Err(StoreError::new(format!(
                    "unsupported pipeline stage '{}'",
                    other
                )))
            }
        };
    }
    Ok(docs)
}

/// `"$field"` references resolve against the document; other values are constants
fn eval_expr(doc: &Document, expr: &Bson) -> Option<Bson> {
    match expr {
        Bson::String(s) if s.starts_with('$') => get_path(doc, &s[1..]).cloned(),
        other => Some(other.clone()),
    }
}

fn group(docs: &[Document], spec: &Document) -> StoreResult<Vec<Document>> {
    let key_expr = spec
        .get("_id")
        .ok_or_else(|| StoreError::new("$group requires an _id"))?;

    // insertion-ordered groups
    let mut keys: Vec<Bson> = Vec::new();
    let mut members: Vec<Vec<&Document>> = Vec::new();
    for doc in docs {
        let key = eval_expr(doc, key_expr).unwrap_or(Bson::Null);
        match keys.iter().position(|k| bson_eq(k, &key)) {
            Some(i) => members[i].push(doc),
            None => {
                keys.push(key);
                members.push(vec![doc]);
            }
        }
    }

    let mut out = Vec::with_capacity(keys.len());
    for (key, group_docs) in keys.into_iter().zip(members) {
        let mut row = doc! { "_id": key };
        for (field, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
            let (op, arg) = match acc {
                Bson::Document(d) if d.len() == 1 => match d.iter().next() {
                    Some(entry) => entry,
                    None => continue,
                },
                _ => {
                    return Err(StoreError::new(format!(
                        "$group field '{}' must be a single accumulator",
                        field
                    )))
                }
            };
            let values: Vec<f64> = group_docs
                .iter()
                .filter_map(|d| eval_expr(d, arg).as_ref().and_then(as_f64))
                .collect();
            let value = match op.as_str() {
                "$sum" => Bson::Double(values.iter().sum()),
                "$avg" if values.is_empty() => Bson::Null,
                "$avg" => Bson::Double(values.iter().sum::<f64>() / values.len() as f64),
                "$min" => values
                    .iter()
                    .copied()
                    .reduce(f64::min)
                    .map_or(Bson::Null, Bson::Double),
                "$max" => values
                    .iter()
                    .copied()
                    .reduce(f64::max)
                    .map_or(Bson::Null, Bson::Double),
                other => {
                    return Err(StoreError::new(format!(
                        "unsupported accumulator '{}'",
                        other
                    )))
                }
            };
            row.insert(field.clone(), value);
        }
        out.push(row);
    }
    Ok(out)
}
