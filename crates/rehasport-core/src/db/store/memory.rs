use crate::{
    db::{
        Table,
        commit::{CommitBatch, CommitOp, CommitReceipt},
        query::{Direction, Order, Predicate},
        store::{RecordStore, Row, StoredRow},
    },
    error::InternalError,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};
use tokio::sync::Mutex;

type Rows = BTreeMap<String, StoredRow>;
type Staged = BTreeMap<(Table, String), Option<StoredRow>>;

///
/// MemoryStore
///
/// In-process reference implementation of [`RecordStore`]. One lock guards
/// every table, so a commit observes and replaces a consistent snapshot.
///

pub struct MemoryStore {
    tables: Mutex<BTreeMap<Table, Rows>>,
}

impl MemoryStore {
    /// Create a store with every known table present and empty.
    #[must_use]
    pub fn new() -> Self {
        let tables = Table::ALL.into_iter().map(|t| (t, Rows::new())).collect();

        Self {
            tables: Mutex::new(tables),
        }
    }

    /// Remove a table entirely, so subsequent access reports it missing.
    pub async fn drop_table(&self, table: Table) {
        self.tables.lock().await.remove(&table);
    }

    /// Number of rows currently stored in `table`.
    pub async fn len(&self, table: Table) -> Result<usize, InternalError> {
        let tables = self.tables.lock().await;

        table_rows(&tables, table).map(BTreeMap::len)
    }

    // Stage one op on top of the committed tables and earlier staged ops.
    fn stage(
        tables: &BTreeMap<Table, Rows>,
        staged: &mut Staged,
        receipt: &mut CommitReceipt,
        op: &CommitOp,
    ) -> Result<(), InternalError> {
        let table = op.table();
        let id = op.id();
        let current = current_row(tables, staged, table, id)?;

        let next = match op {
            CommitOp::Insert { row, .. } => {
                if current.is_some() {
                    return Err(InternalError::unique_violation(table, &["id"]));
                }

                let mut row = row.clone();
                row.insert("id".to_string(), JsonValue::String(id.to_string()));

                Some(StoredRow {
                    id: id.to_string(),
                    version: 1,
                    row,
                })
            }

            CommitOp::Patch {
                patch,
                expected_version,
                ..
            } => {
                let mut stored = require_row(current, table, id)?;
                check_version(tables, table, id, *expected_version)?;

                if let Some(patched_id) = patch.get("id")
                    && patched_id.as_str() != Some(id)
                {
                    return Err(InternalError::store_unsupported(format!(
                        "primary key of {table}/{id} cannot be patched"
                    )));
                }

                for (field, value) in patch {
                    stored.row.insert(field.clone(), value.clone());
                }
                stored.version = stored.version.saturating_add(1);

                Some(stored)
            }

            CommitOp::Delete {
                expected_version, ..
            } => {
                require_row(current, table, id)?;
                check_version(tables, table, id, *expected_version)?;

                None
            }

            CommitOp::IncrementIfBelow {
                field,
                limit,
                delta,
                expected_version,
                ..
            } => {
                let mut stored = require_row(current, table, id)?;
                check_version(tables, table, id, *expected_version)?;

                let value = int_field(&stored, table, field)?;
                let next = value.checked_add(*delta).ok_or_else(|| {
                    InternalError::store_invariant(format!(
                        "integer overflow on {table}/{id}.{field}"
                    ))
                })?;
                if next > *limit {
                    return Err(InternalError::limit_reached(table, id, field.clone(), *limit));
                }

                stored.row.insert(field.clone(), JsonValue::from(next));
                stored.version = stored.version.saturating_add(1);

                Some(stored)
            }

            CommitOp::DecrementSaturating {
                field,
                delta,
                expected_version,
                ..
            } => {
                let mut stored = require_row(current, table, id)?;
                check_version(tables, table, id, *expected_version)?;

                let value = int_field(&stored, table, field)?;
                let next = value.saturating_sub(*delta);
                let next = if next < 0 {
                    receipt
                        .clamped
                        .push((table, id.to_string(), field.clone()));
                    0
                } else {
                    next
                };

                stored.row.insert(field.clone(), JsonValue::from(next));
                stored.version = stored.version.saturating_add(1);

                Some(stored)
            }
        };

        if let Some(row) = &next {
            check_unique_keys(tables, staged, table, row)?;
        }
        staged.insert((table, id.to_string()), next);

        Ok(())
    }

    async fn apply(&self, batch: CommitBatch) -> Result<CommitReceipt, InternalError> {
        let mut tables = self.tables.lock().await;
        let mut staged = Staged::new();
        let mut receipt = CommitReceipt::default();

        // Phase 1: validate every op against the staged view.
        for op in batch.ops() {
            Self::stage(&tables, &mut staged, &mut receipt, op)?;
        }

        // Phase 2: write. Every table was resolved during staging.
        for ((table, id), row) in staged {
            let Some(rows) = tables.get_mut(&table) else {
                return Err(InternalError::table_missing(table));
            };
            match row {
                Some(row) => {
                    rows.insert(id, row);
                }
                None => {
                    rows.remove(&id);
                }
            }
        }
        receipt.applied = batch.len();

        Ok(receipt)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, table: Table, id: &str) -> Result<Option<StoredRow>, InternalError> {
        let tables = self.tables.lock().await;

        Ok(table_rows(&tables, table)?.get(id).cloned())
    }

    async fn query(
        &self,
        table: Table,
        predicate: &Predicate,
        order: Option<&Order>,
    ) -> Result<Vec<StoredRow>, InternalError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<StoredRow> = table_rows(&tables, table)?
            .values()
            .filter(|stored| predicate.matches(&stored.row))
            .cloned()
            .collect();
        drop(tables);

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let ord = compare_json(a.row.get(&order.field), b.row.get(&order.field));
                let ord = match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                ord.then_with(|| a.id.cmp(&b.id))
            });
        }

        Ok(rows)
    }

    async fn insert(&self, table: Table, id: &str, row: Row) -> Result<StoredRow, InternalError> {
        self.apply(CommitBatch::new().with(CommitOp::Insert {
            table,
            id: id.to_string(),
            row,
        }))
        .await?;

        self.get(table, id)
            .await?
            .ok_or_else(|| InternalError::store_invariant(format!("{table}/{id} missing after insert")))
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<StoredRow, InternalError> {
        self.apply(CommitBatch::new().with(CommitOp::Patch {
            table,
            id: id.to_string(),
            patch,
            expected_version: None,
        }))
        .await?;

        self.get(table, id)
            .await?
            .ok_or_else(|| InternalError::store_invariant(format!("{table}/{id} missing after update")))
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), InternalError> {
        self.apply(CommitBatch::new().with(CommitOp::Delete {
            table,
            id: id.to_string(),
            expected_version: None,
        }))
        .await
        .map(|_| ())
    }

    async fn commit(&self, batch: CommitBatch) -> Result<CommitReceipt, InternalError> {
        self.apply(batch).await
    }
}

//
// Staging helpers
//

fn table_rows(tables: &BTreeMap<Table, Rows>, table: Table) -> Result<&Rows, InternalError> {
    tables
        .get(&table)
        .ok_or_else(|| InternalError::table_missing(table))
}

fn current_row(
    tables: &BTreeMap<Table, Rows>,
    staged: &Staged,
    table: Table,
    id: &str,
) -> Result<Option<StoredRow>, InternalError> {
    let rows = table_rows(tables, table)?;

    Ok(match staged.get(&(table, id.to_string())) {
        Some(row) => row.clone(),
        None => rows.get(id).cloned(),
    })
}

fn require_row(
    current: Option<StoredRow>,
    table: Table,
    id: &str,
) -> Result<StoredRow, InternalError> {
    current.ok_or_else(|| InternalError::store_not_found(table, id))
}

// Versions are pinned to the committed row, not to earlier ops in the batch.
fn check_version(
    tables: &BTreeMap<Table, Rows>,
    table: Table,
    id: &str,
    expected: Option<u64>,
) -> Result<(), InternalError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let found = table_rows(tables, table)?
        .get(id)
        .map_or(0, |stored| stored.version);

    if found == expected {
        Ok(())
    } else {
        Err(InternalError::version_conflict(table, id, expected, found))
    }
}

fn int_field(stored: &StoredRow, table: Table, field: &str) -> Result<i64, InternalError> {
    stored
        .row
        .get(field)
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| {
            InternalError::store_corruption(format!(
                "{table}/{}.{field} does not hold an integer",
                stored.id
            ))
        })
}

fn unique_tuple<'a>(row: &'a Row, fields: &[&str]) -> Option<Vec<&'a JsonValue>> {
    fields
        .iter()
        .map(|field| row.get(*field).filter(|value| !value.is_null()))
        .collect()
}

fn check_unique_keys(
    tables: &BTreeMap<Table, Rows>,
    staged: &Staged,
    table: Table,
    candidate: &StoredRow,
) -> Result<(), InternalError> {
    let rows = table_rows(tables, table)?;

    for fields in table.unique_keys() {
        // Rows with a null component do not participate in the constraint.
        let Some(key) = unique_tuple(&candidate.row, fields) else {
            continue;
        };

        let staged_ids: BTreeSet<&str> = staged
            .keys()
            .filter(|(t, _)| *t == table)
            .map(|(_, id)| id.as_str())
            .collect();

        let committed = rows
            .values()
            .filter(|stored| !staged_ids.contains(stored.id.as_str()));
        let pending = staged
            .iter()
            .filter(|((t, _), _)| *t == table)
            .filter_map(|(_, row)| row.as_ref());

        let clash = committed
            .chain(pending)
            .filter(|stored| stored.id != candidate.id)
            .any(|stored| unique_tuple(&stored.row, fields).as_ref() == Some(&key));

        if clash {
            return Err(InternalError::unique_violation(table, fields));
        }
    }

    Ok(())
}

// Missing and null sort first; mixed kinds order by kind.
fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    const fn rank(value: Option<&JsonValue>) -> u8 {
        match value {
            None | Some(JsonValue::Null) => 0,
            Some(JsonValue::Bool(_)) => 1,
            Some(JsonValue::Number(_)) => 2,
            Some(JsonValue::String(_)) => 3,
            Some(JsonValue::Array(_)) => 4,
            Some(JsonValue::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => match (x.as_i64(), y.as_i64())
        {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
