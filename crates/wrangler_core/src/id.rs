//! Model instance identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a model instance.
///
/// Ids are hyphenated UUID v4 strings that are:
/// - Minted once per instance by [`ModelId::generate`]
/// - Stable for the lifetime of the instance, across re-saves
/// - Preserved when an instance is reconstructed from its record
///
/// Ids read back from storage are taken as-is, so any non-empty string is
/// accepted.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Creates a new random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Wraps an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the id as bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns true if the id is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes an id stored as UTF-8 bytes.
    ///
    /// Returns `None` if the bytes are not UTF-8.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().map(|s| Self(s.to_string()))
    }
}

impl fmt::Debug for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelId({})", self.0)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_uuids() {
        let a = ModelId::generate();
        let b = ModelId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn bytes_roundtrip() {
        let id = ModelId::generate();
        assert_eq!(ModelId::from_bytes(id.as_bytes()), Some(id));
        assert_eq!(ModelId::from_bytes(&[0xFF, 0xFE]), None);
    }

    #[test]
    fn empty_detection() {
        assert!(ModelId::new("").is_empty());
        assert!(!ModelId::from("x").is_empty());
    }
}
