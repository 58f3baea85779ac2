//! Advisory reads.
//!
//! Some views (chat history, activity feeds) may render empty when their
//! backing table has not been provisioned yet. Only entities marked
//! [`AdvisoryEntity`] get that fallback; capacity-bearing tables always
//! propagate store errors.

use crate::{
    db::{
        Db, Loaded,
        query::{Order, Predicate},
    },
    error::InternalError,
    traits::Entity,
};
use tracing::warn;

///
/// AdvisoryEntity
///
/// Marker for entities whose reads may degrade to empty on a missing table.
/// Must never be implemented for courses, enrollments, or profiles.
///

pub trait AdvisoryEntity: Entity {}

/// Query an advisory table, treating an absent table as empty.
pub async fn find_or_empty<E: AdvisoryEntity>(
    db: &Db,
    predicate: &Predicate,
    order: Option<&Order>,
) -> Result<Vec<Loaded<E>>, InternalError> {
    match db.find::<E>(predicate, order).await {
        Err(err) if err.is_table_missing() => {
            warn!(table = %E::TABLE, "advisory table missing, rendering empty");
            Ok(Vec::new())
        }
        other => other,
    }
}
