use crate::{
    db::store::{Row, StoredRow},
    error::{ErrorClass, ErrorOrigin, InternalError},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use thiserror::Error as ThisError;

///
/// SerializeError
///

#[derive(Debug, ThisError)]
pub enum SerializeError {
    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("deserialize error: {0}")]
    Deserialize(String),

    #[error("row is not a JSON object")]
    NotAnObject,
}

impl SerializeError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Serialize(_) => ErrorClass::Internal,
            Self::Deserialize(_) | Self::NotAnObject => ErrorClass::Corruption,
        }
    }
}

impl From<SerializeError> for InternalError {
    fn from(err: SerializeError) -> Self {
        Self::new(err.class(), ErrorOrigin::Serialize, err.to_string())
    }
}

/// Encode a value into a store row.
pub fn to_row<T>(value: &T) -> Result<Row, SerializeError>
where
    T: Serialize,
{
    match serde_json::to_value(value) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(SerializeError::NotAnObject),
        Err(err) => Err(SerializeError::Serialize(err.to_string())),
    }
}

/// Decode a stored row into a typed value.
pub fn from_row<T>(stored: &StoredRow) -> Result<T, SerializeError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(JsonValue::Object(stored.row.clone()))
        .map_err(|err| SerializeError::Deserialize(format!("{}: {err}", stored.id)))
}

/// Encode a single column value.
pub fn to_json<T>(value: &T) -> Result<JsonValue, InternalError>
where
    T: Serialize,
{
    serde_json::to_value(value)
        .map_err(|err| InternalError::serialize_internal(format!("column encode failed: {err}")))
}
