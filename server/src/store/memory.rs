//! In-memory document store with optimistic transactions
//!
//! Documents are JSON objects keyed by slash path, each carrying a version
//! counter. Transactions validate at commit time that every document in the
//! read set still has the version observed at snapshot time
//! (first-committer-wins) and retry the mutate cycle otherwise.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use super::{
    DocPath, DocumentStore, FieldOp, Filter, FilterOp, MutateFn, OrderBy, StoreError, TxnSnapshot,
    TxnWrites, WriteOp, MAX_TXN_ATTEMPTS,
};

#[derive(Debug, Clone)]
struct VersionedDoc {
    version: u64,
    fields: Value,
}

#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, VersionedDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        Ok(self
            .docs
            .read()
            .get(path.as_str())
            .map(|d| d.fields.clone()))
    }

    async fn set(&self, path: &DocPath, fields: Value) -> Result<(), StoreError> {
        if !fields.is_object() {
            return Err(StoreError::Invalid(format!(
                "document fields must be an object: {path}"
            )));
        }
        let mut docs = self.docs.write();
        let version = docs.get(path.as_str()).map(|d| d.version).unwrap_or(0) + 1;
        docs.insert(path.as_str().to_string(), VersionedDoc { version, fields });
        Ok(())
    }

    async fn update(&self, path: &DocPath, ops: Vec<(String, FieldOp)>) -> Result<(), StoreError> {
        let mut docs = self.docs.write();
        let doc = docs
            .get_mut(path.as_str())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        for (field, op) in &ops {
            apply_field_op(&mut doc.fields, field, op)?;
        }
        doc.version += 1;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.docs.write().remove(path.as_str());
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: Vec<Filter>,
        order: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let prefix = format!("{collection}/");
        let docs = self.docs.read();
        let mut results: Vec<(String, Value)> = docs
            .iter()
            .filter(|(path, _)| {
                path.starts_with(&prefix) && !path[prefix.len()..].contains('/')
            })
            .filter(|(_, doc)| filters.iter().all(|f| matches_filter(&doc.fields, f)))
            .map(|(path, doc)| (path[prefix.len()..].to_string(), doc.fields.clone()))
            .collect();
        drop(docs);

        if let Some(order) = &order {
            results.sort_by(|(_, a), (_, b)| {
                let ord = compare_values(
                    field_value(a, &order.field).unwrap_or(&Value::Null),
                    field_value(b, &order.field).unwrap_or(&Value::Null),
                );
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn run_transaction(
        &self,
        read_set: Vec<DocPath>,
        mutate: MutateFn,
    ) -> Result<Value, StoreError> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            // Snapshot phase: versions + fields of the read set.
            let mut versions = HashMap::with_capacity(read_set.len());
            let mut snapshot_docs = HashMap::with_capacity(read_set.len());
            {
                let docs = self.docs.read();
                for path in &read_set {
                    let entry = docs.get(path.as_str());
                    versions.insert(path.clone(), entry.map(|d| d.version).unwrap_or(0));
                    snapshot_docs.insert(path.clone(), entry.map(|d| d.fields.clone()));
                }
            }

            let snapshot = TxnSnapshot::new(snapshot_docs);
            let mut writes = TxnWrites::default();
            // Closure errors abort the transaction; only version conflicts retry.
            let result = mutate(&snapshot, &mut writes)?;

            // Commit phase: validate versions, then apply buffered writes.
            let mut docs = self.docs.write();
            let conflicted = versions.iter().any(|(path, &version)| {
                docs.get(path.as_str()).map(|d| d.version).unwrap_or(0) != version
            });
            if conflicted {
                drop(docs);
                metrics::counter!("store_txn_retries_total", 1);
                debug!(attempt, "transaction read set changed, retrying");
                continue;
            }

            for op in &writes.ops {
                match op {
                    WriteOp::Set(path, fields) => {
                        let version =
                            docs.get(path.as_str()).map(|d| d.version).unwrap_or(0) + 1;
                        docs.insert(
                            path.as_str().to_string(),
                            VersionedDoc {
                                version,
                                fields: fields.clone(),
                            },
                        );
                    }
                    WriteOp::Update(path, ops) => {
                        let doc = docs
                            .get_mut(path.as_str())
                            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                        for (field, op) in ops {
                            apply_field_op(&mut doc.fields, field, op)?;
                        }
                        doc.version += 1;
                    }
                    WriteOp::Delete(path) => {
                        docs.remove(path.as_str());
                    }
                }
            }
            return Ok(result);
        }
        Err(StoreError::Conflict(MAX_TXN_ATTEMPTS))
    }
}

/// Apply a single field operation, navigating dotted paths and creating
/// intermediate objects as needed.
fn apply_field_op(fields: &mut Value, path: &str, op: &FieldOp) -> Result<(), StoreError> {
    let map = fields
        .as_object_mut()
        .ok_or_else(|| StoreError::Invalid("document root is not an object".into()))?;

    let mut segments = path.split('.').peekable();
    let mut current = map;
    loop {
        let segment = segments
            .next()
            .ok_or_else(|| StoreError::Invalid("empty field path".into()))?;
        if segments.peek().is_none() {
            apply_leaf_op(current, segment, op)?;
            return Ok(());
        }
        let next = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = next.as_object_mut().ok_or_else(|| {
            StoreError::Invalid(format!("field '{segment}' in '{path}' is not an object"))
        })?;
    }
}

fn apply_leaf_op(map: &mut Map<String, Value>, key: &str, op: &FieldOp) -> Result<(), StoreError> {
    match op {
        FieldOp::Set(value) => {
            map.insert(key.to_string(), value.clone());
        }
        FieldOp::Increment(delta) => {
            let current = map.get(key).and_then(Value::as_i64).unwrap_or(0);
            map.insert(key.to_string(), Value::from(current + delta));
        }
        FieldOp::ArrayUnion(value) => {
            let arr = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            let arr = arr.as_array_mut().ok_or_else(|| {
                StoreError::Invalid(format!("field '{key}' is not an array"))
            })?;
            if !arr.contains(value) {
                arr.push(value.clone());
            }
        }
        FieldOp::ArrayRemove(value) => {
            if let Some(arr) = map.get_mut(key).and_then(Value::as_array_mut) {
                arr.retain(|v| v != value);
            }
        }
        FieldOp::Delete => {
            map.remove(key);
        }
    }
    Ok(())
}

fn field_value<'a>(fields: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = fields;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn matches_filter(fields: &Value, filter: &Filter) -> bool {
    let value = field_value(fields, &filter.field);
    match filter.op {
        FilterOp::Eq => value == Some(&filter.value),
        FilterOp::ArrayContains => value
            .and_then(Value::as_array)
            .map(|arr| arr.contains(&filter.value))
            .unwrap_or(false),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
