//! Document store abstraction
//!
//! The backing database is an external collaborator: a document store with
//! get/set/update/delete/query primitives and optimistic-concurrency
//! transactions. Everything the server persists goes through the
//! [`DocumentStore`] trait; [`MemoryStore`] is the in-process implementation
//! used by tests and by the default `STORE=memory` deployment.
//!
//! Transactions follow a read-set + mutate contract: the store reads the
//! declared documents, runs the (synchronous) mutate closure against that
//! snapshot, and commits the buffered writes only if none of the read
//! documents changed in the meantime. On conflict the whole cycle is
//! retried up to [`MAX_TXN_ATTEMPTS`] times. No in-memory lock is ever held
//! across an await; the version check at commit is the sole consistency
//! mechanism.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Retry budget for optimistic transactions before surfacing a conflict.
pub const MAX_TXN_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("transaction conflict persisted after {0} attempts")]
    Conflict(u32),

    #[error("invalid operation: {0}")]
    Invalid(String),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store backend: {0}")]
    Backend(String),
}

/// Slash-separated document path, e.g. `conversations/<id>/messages/<mid>`.
///
/// Paths always have an even number of segments (collection/id pairs), so
/// string-format bugs surface as a typed constructor instead of a scattered
/// `format!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath(String);

impl DocPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn user(id: &str) -> Self {
        Self(format!("users/{id}"))
    }

    pub fn conversation(id: &str) -> Self {
        Self(format!("conversations/{id}"))
    }

    pub fn message(conversation_id: &str, message_id: &str) -> Self {
        Self(format!("conversations/{conversation_id}/messages/{message_id}"))
    }

    pub fn friend_request(id: &str) -> Self {
        Self(format!("friendRequests/{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Document id: the last path segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Parent collection path (everything before the final segment).
    pub fn collection(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-field write operation. Field paths may be dotted
/// (`unreadCounts.<uid>`) and address nested maps.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Replace the field.
    Set(Value),
    /// Atomic numeric increment; missing fields start at zero.
    Increment(i64),
    /// Append the value unless an equal element is already present.
    ArrayUnion(Value),
    /// Remove every element equal to the value.
    ArrayRemove(Value),
    /// Remove the field.
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    ArrayContains,
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::ArrayContains,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Snapshot of the transaction read set, keyed by path.
pub struct TxnSnapshot {
    docs: HashMap<DocPath, Option<Value>>,
}

impl TxnSnapshot {
    pub fn new(docs: HashMap<DocPath, Option<Value>>) -> Self {
        Self { docs }
    }

    /// Fields of a document in the read set; `None` if it does not exist.
    /// Reading a path outside the declared read set is a programming error
    /// and returns `None` as well.
    pub fn get(&self, path: &DocPath) -> Option<&Value> {
        self.docs.get(path).and_then(|v| v.as_ref())
    }

    /// Like [`Self::get`] but surfaces a missing document as `NotFound`.
    pub fn require(&self, path: &DocPath) -> Result<&Value, StoreError> {
        self.get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}

/// Buffered writes produced by a transaction's mutate closure.
#[derive(Default)]
pub struct TxnWrites {
    pub(crate) ops: Vec<WriteOp>,
}

#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    Set(DocPath, Value),
    Update(DocPath, Vec<(String, FieldOp)>),
    Delete(DocPath),
}

impl TxnWrites {
    pub fn set(&mut self, path: &DocPath, fields: Value) {
        self.ops.push(WriteOp::Set(path.clone(), fields));
    }

    pub fn update(&mut self, path: &DocPath, ops: Vec<(String, FieldOp)>) {
        self.ops.push(WriteOp::Update(path.clone(), ops));
    }

    pub fn delete(&mut self, path: &DocPath) {
        self.ops.push(WriteOp::Delete(path.clone()));
    }
}

/// Mutate closure for [`DocumentStore::run_transaction`]. Runs against the
/// snapshot with no awaits, so it may be re-invoked on conflict retry.
/// Errors returned from the closure abort the transaction without retrying.
pub type MutateFn =
    Box<dyn Fn(&TxnSnapshot, &mut TxnWrites) -> Result<Value, StoreError> + Send + Sync>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError>;

    /// Create or fully replace a document.
    async fn set(&self, path: &DocPath, fields: Value) -> Result<(), StoreError>;

    /// Apply field operations to an existing document atomically.
    /// Fails with `NotFound` if the document does not exist.
    async fn update(&self, path: &DocPath, ops: Vec<(String, FieldOp)>) -> Result<(), StoreError>;

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError>;

    async fn query(
        &self,
        collection: &str,
        filters: Vec<Filter>,
        order: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    /// Optimistic transaction over the declared read set: read, mutate,
    /// commit-if-unchanged, retried on conflict. Returns whatever value the
    /// mutate closure produced on the committed attempt.
    async fn run_transaction(
        &self,
        read_set: Vec<DocPath>,
        mutate: MutateFn,
    ) -> Result<Value, StoreError>;
}
