pub mod advisory;
pub mod commit;
pub mod query;
pub mod store;

mod table;

pub use table::Table;

use crate::{
    db::{
        commit::{CommitBatch, CommitOp, CommitReceipt},
        query::{Order, Predicate},
        store::{RecordStore, Row, StoredRow},
    },
    error::InternalError,
    serialize::{from_row, to_row},
    traits::Entity,
};
use std::sync::Arc;

///
/// Db
///
/// Process-wide handle to the record store. Constructed once at startup
/// and cloned into every service; clones share the same backend.
///

#[derive(Clone)]
pub struct Db {
    store: Arc<dyn RecordStore>,
}

impl Db {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    //
    // Typed reads
    //

    /// Load one entity by primary key.
    pub async fn load<E: Entity>(&self, id: &str) -> Result<Option<Loaded<E>>, InternalError> {
        self.store
            .get(E::TABLE, id)
            .await?
            .map(|stored| Loaded::decode(&stored))
            .transpose()
    }

    /// Load every entity matching `predicate`.
    pub async fn find<E: Entity>(
        &self,
        predicate: &Predicate,
        order: Option<&Order>,
    ) -> Result<Vec<Loaded<E>>, InternalError> {
        self.store
            .query(E::TABLE, predicate, order)
            .await?
            .iter()
            .map(Loaded::decode)
            .collect()
    }

    //
    // Typed writes
    //

    /// Insert a new entity; fails with a unique violation if the key exists.
    pub async fn insert<E: Entity>(&self, entity: &E) -> Result<Loaded<E>, InternalError> {
        let row = to_row(entity)?;
        let stored = self.store.insert(E::TABLE, entity.key(), row).await?;

        Loaded::decode(&stored)
    }

    /// Apply a batch all-or-nothing.
    pub async fn commit(&self, batch: CommitBatch) -> Result<CommitReceipt, InternalError> {
        self.store.commit(batch).await
    }
}

///
/// Loaded
///
/// An entity plus the store version it was read at.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Loaded<E> {
    pub entity: E,
    pub version: u64,
}

impl<E: Entity> Loaded<E> {
    fn decode(stored: &StoredRow) -> Result<Self, InternalError> {
        let entity = from_row(stored)?;

        Ok(Self {
            entity,
            version: stored.version,
        })
    }

    /// Delete op pinned to the loaded version.
    #[must_use]
    pub fn delete_op(&self) -> CommitOp {
        CommitOp::Delete {
            table: E::TABLE,
            id: self.entity.key().to_string(),
            expected_version: Some(self.version),
        }
    }

    /// Patch op pinned to the loaded version.
    #[must_use]
    pub fn patch_op(&self, patch: Row) -> CommitOp {
        CommitOp::Patch {
            table: E::TABLE,
            id: self.entity.key().to_string(),
            patch,
            expected_version: Some(self.version),
        }
    }
}

/// Insert op for a new entity.
pub fn insert_op<E: Entity>(entity: &E) -> Result<CommitOp, InternalError> {
    Ok(CommitOp::Insert {
        table: E::TABLE,
        id: entity.key().to_string(),
        row: to_row(entity)?,
    })
}
