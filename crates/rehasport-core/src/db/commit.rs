//! Commit batches and atomicity guardrails.
//!
//! Contract: a [`CommitBatch`] is applied all-or-nothing. Stores validate
//! every operation against a staged view first; once validation passes, the
//! staged rows are written without any fallible step or suspension point.

use crate::db::{Table, store::Row};

///
/// CommitOp
///
/// One mutation inside a batch. `expected_version` pins the row to the
/// version the caller read; a mismatch fails the whole batch with a
/// version conflict.
///

#[derive(Clone, Debug, PartialEq)]
pub enum CommitOp {
    Insert {
        table: Table,
        id: String,
        row: Row,
    },
    Patch {
        table: Table,
        id: String,
        patch: Row,
        expected_version: Option<u64>,
    },
    Delete {
        table: Table,
        id: String,
        expected_version: Option<u64>,
    },
    /// Add `delta` to an integer field only while the result stays at or
    /// below `limit`.
    IncrementIfBelow {
        table: Table,
        id: String,
        field: String,
        limit: i64,
        delta: i64,
        expected_version: Option<u64>,
    },
    /// Subtract `delta` from an integer field, clamping at zero.
    DecrementSaturating {
        table: Table,
        id: String,
        field: String,
        delta: i64,
        expected_version: Option<u64>,
    },
}

impl CommitOp {
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::Insert { table, .. }
            | Self::Patch { table, .. }
            | Self::Delete { table, .. }
            | Self::IncrementIfBelow { table, .. }
            | Self::DecrementSaturating { table, .. } => *table,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Insert { id, .. }
            | Self::Patch { id, .. }
            | Self::Delete { id, .. }
            | Self::IncrementIfBelow { id, .. }
            | Self::DecrementSaturating { id, .. } => id,
        }
    }
}

///
/// CommitBatch
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitBatch {
    ops: Vec<CommitOp>,
}

impl CommitBatch {
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, op: CommitOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn push(&mut self, op: CommitOp) {
        self.ops.push(op);
    }

    #[must_use]
    pub fn ops(&self) -> &[CommitOp] {
        &self.ops
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

///
/// CommitReceipt
///
/// Outcome of a successful batch.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommitReceipt {
    /// Operations applied.
    pub applied: usize,

    /// Saturating decrements that hit zero before subtracting the full delta.
    pub clamped: Vec<(Table, String, String)>,
}

impl CommitReceipt {
    #[must_use]
    pub const fn was_clamped(&self) -> bool {
        !self.clamped.is_empty()
    }
}
