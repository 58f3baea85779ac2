//! Fixtures and failure-injecting stores shared by unit tests.

use crate::{
    db::{
        Db, Table,
        commit::{CommitBatch, CommitReceipt},
        query::{Order, Predicate},
        store::{MemoryStore, RecordStore, Row, StoredRow},
    },
    error::InternalError,
    model::{Course, CourseStatus, Profile, Role},
    obs::MetricsRegistry,
    types::{CourseId, PrincipalId, Timestamp},
};
use async_trait::async_trait;
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

pub(crate) fn memory_db() -> (Arc<MemoryStore>, Db) {
    let store = Arc::new(MemoryStore::new());

    (store.clone(), Db::new(store))
}

pub(crate) fn registry() -> Arc<MetricsRegistry> {
    Arc::new(MetricsRegistry::new())
}

pub(crate) fn course(id: &str, capacity: u32, current: u32) -> Course {
    Course {
        id: CourseId::new(id),
        title: format!("Course {id}"),
        description: None,
        capacity,
        current_enrollment: current,
        status: CourseStatus::Active,
        instructor_id: None,
        start: Timestamp::from_seconds(1_700_000_000),
        end: Timestamp::from_seconds(1_700_003_600),
        location: None,
    }
}

pub(crate) async fn seed_course(db: &Db, id: &str, capacity: u32, current: u32) -> Course {
    let course = course(id, capacity, current);
    db.insert(&course).await.expect("course seed should succeed");

    course
}

pub(crate) async fn seed_profile(db: &Db, id: &str, role: Role) -> Profile {
    let profile = Profile::new(PrincipalId::new(id), Some(format!("{id}@example.test")), role);
    db.insert(&profile).await.expect("profile seed should succeed");

    profile
}

///
/// UnavailableStore
///
/// Every call fails as if the backend were unreachable.
///

pub(crate) struct UnavailableStore;

impl UnavailableStore {
    fn fail<T>() -> Result<T, InternalError> {
        Err(InternalError::store_unavailable("connection refused"))
    }
}

#[async_trait]
impl RecordStore for UnavailableStore {
    async fn get(&self, _: Table, _: &str) -> Result<Option<StoredRow>, InternalError> {
        Self::fail()
    }

    async fn query(
        &self,
        _: Table,
        _: &Predicate,
        _: Option<&Order>,
    ) -> Result<Vec<StoredRow>, InternalError> {
        Self::fail()
    }

    async fn insert(&self, _: Table, _: &str, _: Row) -> Result<StoredRow, InternalError> {
        Self::fail()
    }

    async fn update(&self, _: Table, _: &str, _: Row) -> Result<StoredRow, InternalError> {
        Self::fail()
    }

    async fn delete(&self, _: Table, _: &str) -> Result<(), InternalError> {
        Self::fail()
    }

    async fn commit(&self, _: CommitBatch) -> Result<CommitReceipt, InternalError> {
        Self::fail()
    }
}

///
/// ConflictingStore
///
/// Wraps a store and fails the next `conflicts` commits with a version
/// conflict before delegating.
///

pub(crate) struct ConflictingStore {
    inner: Arc<dyn RecordStore>,
    conflicts: AtomicU32,
    commits: AtomicU32,
}

impl ConflictingStore {
    pub(crate) fn new(inner: Arc<dyn RecordStore>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
            commits: AtomicU32::new(0),
        }
    }

    pub(crate) fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for ConflictingStore {
    async fn get(&self, table: Table, id: &str) -> Result<Option<StoredRow>, InternalError> {
        self.inner.get(table, id).await
    }

    async fn query(
        &self,
        table: Table,
        predicate: &Predicate,
        order: Option<&Order>,
    ) -> Result<Vec<StoredRow>, InternalError> {
        self.inner.query(table, predicate, order).await
    }

    async fn insert(&self, table: Table, id: &str, row: Row) -> Result<StoredRow, InternalError> {
        self.inner.insert(table, id, row).await
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<StoredRow, InternalError> {
        self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), InternalError> {
        self.inner.delete(table, id).await
    }

    async fn commit(&self, batch: CommitBatch) -> Result<CommitReceipt, InternalError> {
        self.commits.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            let (table, id) = batch
                .ops()
                .first()
                .map_or((Table::Courses, ""), |op| (op.table(), op.id()));
            return Err(InternalError::version_conflict(table, id, 1, 2));
        }

        self.inner.commit(batch).await
    }
}
