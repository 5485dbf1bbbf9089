//! Durable record encoding.

use crate::error::{CoreError, CoreResult};
use crate::id::ModelId;
use crate::value::{Props, Value};

const ID_FIELD: &str = "id";

/// The stored form of a model instance.
///
/// On disk a record is a CBOR map holding `"id"` next to the persisted
/// attributes:
///
/// ```text
/// { "id": "0f8c…", "username": "ada", "age": 36 }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Instance id.
    pub id: ModelId,
    /// Persisted attribute values.
    pub attributes: Props,
}

impl Record {
    /// Creates a record.
    pub fn new(id: ModelId, attributes: Props) -> Self {
        Self { id, attributes }
    }

    /// Returns a persisted attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Encodes the record as a CBOR map.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if CBOR serialization fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut map = self.attributes.clone();
        map.insert(ID_FIELD.to_string(), Value::Text(self.id.to_string()));

        let mut bytes = Vec::new();
        ciborium::into_writer(&map, &mut bytes).map_err(CoreError::encoding)?;
        Ok(bytes)
    }

    /// Decodes a record.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` for bytes that are not a CBOR map and `MissingId`
    /// if the map has no non-empty text `"id"`.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let mut map: Props = ciborium::from_reader(bytes).map_err(CoreError::encoding)?;
        let id = match map.remove(ID_FIELD) {
            Some(Value::Text(id)) if !id.is_empty() => ModelId::from(id),
            _ => return Err(CoreError::MissingId),
        };
        Ok(Self {
            id,
            attributes: map,
        })
    }
}
