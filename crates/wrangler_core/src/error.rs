//! Error types for Wrangler core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Wrangler core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error. Propagated unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] wrangler_storage::StorageError),

    /// A stored record or metadata value could not be encoded or decoded.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },

    /// The attribute is not declared in the model's schema.
    #[error("unknown attribute: {name}")]
    UnknownAttribute {
        /// Name of the attribute.
        name: String,
    },

    /// A property collides with a reserved instance member name.
    #[error("property {name:?} collides with a reserved member name")]
    ReservedKeyConflict {
        /// The offending property name.
        name: String,
    },

    /// A required attribute is null at save time.
    #[error("required attribute {name} is missing")]
    MissingRequired {
        /// Name of the attribute.
        name: String,
    },

    /// A value cannot be stored in the position it was given.
    #[error("invalid value for {attribute}: {message}")]
    InvalidValue {
        /// Name of the attribute.
        attribute: String,
        /// Why the value was rejected.
        message: String,
    },

    /// A model or attribute name is not usable.
    #[error("invalid name {name:?}: {message}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        message: String,
    },

    /// The schema already declares this attribute.
    #[error("attribute already exists: {name}")]
    AttributeExists {
        /// Name of the attribute.
        name: String,
    },

    /// The instance belongs to a different model kind.
    #[error("instance of model {actual} passed to factory for {expected}")]
    ForeignModel {
        /// The factory's model name.
        expected: String,
        /// The instance's model name.
        actual: String,
    },

    /// A factory with this name is already bound.
    #[error("model already bound: {name}")]
    ModelExists {
        /// Name of the model.
        name: String,
    },

    /// No record exists under the id.
    #[error("record not found: {id} in model {model}")]
    NotFound {
        /// The model searched.
        model: String,
        /// The id that was not found.
        id: String,
    },

    /// An indexed value is already taken by another record.
    #[error("index collision on {attribute}={value}: already held by {existing}")]
    IndexCollision {
        /// The indexed attribute.
        attribute: String,
        /// Token of the colliding value.
        value: String,
        /// Id of the record holding the value.
        existing: String,
    },

    /// An id was required but empty or absent.
    #[error("missing id")]
    MissingId,

    /// The instance was removed and can no longer be used.
    #[error("instance {id} has been removed")]
    InstanceRemoved {
        /// Id of the removed instance.
        id: String,
    },

    /// The instance is not in the factory cache.
    #[error("instance not in cache")]
    NotInCache,

    /// Popped from an empty change log.
    #[error("change log is empty")]
    EmptyLog,

    /// The handle has been closed.
    #[error("wrangler is closed")]
    Closed,
}

impl CoreError {
    /// Creates an encoding error.
    pub fn encoding(message: impl std::fmt::Display) -> Self {
        Self::Encoding {
            message: message.to_string(),
        }
    }

    /// Creates an unknown attribute error.
    pub fn unknown_attribute(name: impl Into<String>) -> Self {
        Self::UnknownAttribute { name: name.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Returns true if the error is a caller mistake detected before any I/O.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownAttribute { .. }
                | Self::ReservedKeyConflict { .. }
                | Self::MissingRequired { .. }
                | Self::InvalidValue { .. }
                | Self::InvalidName { .. }
                | Self::AttributeExists { .. }
                | Self::ForeignModel { .. }
                | Self::ModelExists { .. }
                | Self::MissingId
        )
    }

    /// Returns true if repeating the operation may succeed.
    ///
    /// Store I/O failures are retryable; the change log of a failed save is
    /// left intact so a retry replays it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => !matches!(
                e,
                wrangler_storage::StorageError::Locked
                    | wrangler_storage::StorageError::Closed
                    | wrangler_storage::StorageError::Corrupted(_)
            ),
            _ => false,
        }
    }
}
