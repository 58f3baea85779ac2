use crate::db::Table;
use serde::{Serialize, de::DeserializeOwned};

///
/// Entity
///
/// A typed record stored in one table under a string primary key.
///

pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: Table;

    /// Primary key as stored in the `id` column.
    fn key(&self) -> &str;
}
