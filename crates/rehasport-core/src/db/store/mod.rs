mod memory;


pub use memory::MemoryStore;

use crate::{
    db::{
        Table,
        commit::{CommitBatch, CommitOp, CommitReceipt},
        query::{Order, Predicate},
    },
    error::InternalError,
};
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

/// A record as exchanged with the store: a JSON object keyed by column.
pub type Row = Map<String, JsonValue>;

///
/// StoredRow
///
/// A row together with its primary key and the version assigned by the
/// store. Versions increase on every write to the row.
///

#[derive(Clone, Debug, PartialEq)]
pub struct StoredRow {
    pub id: String,
    pub version: u64,
    pub row: Row,
}

///
/// RecordStore
///
/// Contract of the relational backend. Implementations must make
/// [`RecordStore::commit`] all-or-nothing with respect to every other call.
///

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn get(&self, table: Table, id: &str) -> Result<Option<StoredRow>, InternalError>;

    async fn query(
        &self,
        table: Table,
        predicate: &Predicate,
        order: Option<&Order>,
    ) -> Result<Vec<StoredRow>, InternalError>;

    async fn insert(&self, table: Table, id: &str, row: Row) -> Result<StoredRow, InternalError>;

    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<StoredRow, InternalError>;

    async fn delete(&self, table: Table, id: &str) -> Result<(), InternalError>;

    /// Apply every operation in `batch`, or none of them.
    async fn commit(&self, batch: CommitBatch) -> Result<CommitReceipt, InternalError>;

    /// Add `delta` to `field` if the result stays within `limit`.
    /// Returns `Ok(false)` when the limit would be exceeded.
    async fn atomic_increment_if_below_limit(
        &self,
        table: Table,
        id: &str,
        field: &str,
        limit: i64,
        delta: i64,
    ) -> Result<bool, InternalError> {
        let batch = CommitBatch::new().with(CommitOp::IncrementIfBelow {
            table,
            id: id.to_string(),
            field: field.to_string(),
            limit,
            delta,
            expected_version: None,
        });

        match self.commit(batch).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_limit_reached() => Ok(false),
            Err(err) => Err(err),
        }
    }
}
