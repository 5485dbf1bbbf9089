//! Key layout of one model kind.
//!
//! Every key starts with the separator byte `S` followed by the model name:
//!
//! ```text
//! records:  S kind S "r" S id
//! index:    S kind S "i" S attribute S token
//! metadata: S S "models"
//! ```
//!
//! Names and tokens may not contain `S`, so a prefix scan over
//! `S kind S "i" S attribute S` enumerates exactly that attribute's entries.

use crate::error::{CoreError, CoreResult};
use crate::id::ModelId;
use wrangler_storage::{key_successor, KeyRange};

const RECORDS_TAG: u8 = b'r';
const INDEX_TAG: u8 = b'i';
const METADATA_TAG: &[u8] = b"models";

/// Id and key generation for one model kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    separator: u8,
    kind: String,
    records_prefix: Vec<u8>,
    index_prefix: Vec<u8>,
}

impl KeySpace {
    /// Creates the key space of model `kind`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if the name is empty or contains the separator.
    pub fn new(kind: impl Into<String>, separator: u8) -> CoreResult<Self> {
        let kind = kind.into();
        check_segment(separator, &kind, "model")?;

        let mut base = vec![separator];
        base.extend_from_slice(kind.as_bytes());
        base.push(separator);

        let mut records_prefix = base.clone();
        records_prefix.extend_from_slice(&[RECORDS_TAG, separator]);
        let mut index_prefix = base;
        index_prefix.extend_from_slice(&[INDEX_TAG, separator]);

        Ok(Self {
            separator,
            kind,
            records_prefix,
            index_prefix,
        })
    }

    /// The separator byte.
    #[must_use]
    pub fn separator(&self) -> u8 {
        self.separator
    }

    /// The model name.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Mints a fresh instance id.
    #[must_use]
    pub fn mint_id(&self) -> ModelId {
        ModelId::generate()
    }

    /// Checks that an attribute name can be used inside keys.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if the name is empty or contains the separator.
    pub fn check_attribute(&self, attribute: &str) -> CoreResult<()> {
        check_segment(self.separator, attribute, "attribute")
    }

    /// Checks that an index token can be used inside keys.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if the token contains the separator.
    pub fn check_token(&self, attribute: &str, token: &str) -> CoreResult<()> {
        if token.as_bytes().contains(&self.separator) {
            return Err(CoreError::invalid_value(
                attribute,
                format!("indexed value contains separator byte {:#04x}", self.separator),
            ));
        }
        Ok(())
    }

    /// Key of the record with `id`.
    #[must_use]
    pub fn record_key(&self, id: &ModelId) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.records_prefix.len() + id.as_str().len());
        key.extend_from_slice(&self.records_prefix);
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Range holding every record of this kind, in id order.
    #[must_use]
    pub fn records_range(&self) -> KeyRange {
        KeyRange::prefix(self.records_prefix.clone())
    }

    /// Extracts the id from a record key.
    #[must_use]
    pub fn id_from_record_key(&self, key: &[u8]) -> Option<ModelId> {
        key.strip_prefix(self.records_prefix.as_slice())
            .and_then(ModelId::from_bytes)
    }

    /// Key of the index entry for `token` of `attribute`.
    #[must_use]
    pub fn index_key(&self, attribute: &str, token: &str) -> Vec<u8> {
        let mut key = self.attribute_prefix(attribute);
        key.extend_from_slice(token.as_bytes());
        key
    }

    /// Range holding every index entry of `attribute`, in token order.
    #[must_use]
    pub fn index_range(&self, attribute: &str) -> KeyRange {
        KeyRange::prefix(self.attribute_prefix(attribute))
    }

    /// Range of `attribute` entries with `lower <= token <= upper`.
    ///
    /// Missing bounds leave that side open.
    #[must_use]
    pub fn index_bounds(&self, attribute: &str, lower: Option<&str>, upper: Option<&str>) -> KeyRange {
        let full = self.index_range(attribute);
        let start = match lower {
            Some(token) => self.index_key(attribute, token),
            None => full.start().to_vec(),
        };
        let end = match upper {
            Some(token) => Some(key_successor(&self.index_key(attribute, token))),
            None => full.end().map(<[u8]>::to_vec),
        };
        KeyRange::new(start, end)
    }

    /// Extracts the token from an index key of `attribute`.
    #[must_use]
    pub fn token_from_index_key(&self, attribute: &str, key: &[u8]) -> Option<String> {
        let prefix = self.attribute_prefix(attribute);
        key.strip_prefix(prefix.as_slice())
            .and_then(|rest| std::str::from_utf8(rest).ok())
            .map(str::to_string)
    }

    /// Key of the model registry.
    #[must_use]
    pub fn metadata_key(separator: u8) -> Vec<u8> {
        let mut key = vec![separator, separator];
        key.extend_from_slice(METADATA_TAG);
        key
    }

    fn attribute_prefix(&self, attribute: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.index_prefix.len() + attribute.len() + 1);
        key.extend_from_slice(&self.index_prefix);
        key.extend_from_slice(attribute.as_bytes());
        key.push(self.separator);
        key
    }
}

fn check_segment(separator: u8, name: &str, what: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_name(name, format!("{what} names cannot be empty")));
    }
    if name.as_bytes().contains(&separator) {
        return Err(CoreError::invalid_name(
            name,
            format!("{what} names cannot contain separator byte {separator:#04x}"),
        ));
    }
    Ok(())
}
