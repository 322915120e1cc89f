//! Error types and result types for registration, expression building, decoding and
//! store operations.
//!
//! Construction-time problems ([`RegistrationError`], [`ExpressionError`]) stop an
//! operation before it ever reaches a store. Runtime problems ([`DeserializeError`],
//! [`StoreError`]) are returned to the immediate caller. Persistence calls wrap all of
//! them in [`ModelError`]; use [`ModelResult<T>`] as the return type for those.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// A record type could not be registered.
///
/// The derive macro reports these as compile errors; this type surfaces them for
/// schemas assembled by hand with [`SchemaBuilder`](crate::field::SchemaBuilder).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Two fields of the same record map to the same document key.
    #[error("duplicate document key `{key}` in record {record}")]
    DuplicateKey { record: &'static str, key: &'static str },
    /// The document key cannot be addressed through dotted paths.
    #[error("invalid document key `{key}` in record {record}: {reason}")]
    InvalidKey {
        record: &'static str,
        key: &'static str,
        reason: &'static str,
    },
    /// A data field uses the key reserved for the identifier.
    #[error("data field `{name}` of record {record} cannot use the reserved key `_id`")]
    ReservedKey { record: &'static str, name: &'static str },
    /// More than one identifier field was declared.
    #[error("record {record} declares more than one identifier field")]
    DuplicateIdentifier { record: &'static str },
}

/// An expression was rejected while it was being built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// The path does not name a field of the record.
    #[error("unknown field `{path}` on record {record}")]
    UnknownField { record: &'static str, path: String },
    /// The literal value does not match the declared type of the field.
    #[error("type mismatch on `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },
    /// The operator cannot be applied to a field of this type.
    #[error("operator {op} cannot be applied to `{path}` of type {field_type}")]
    InvalidOperator {
        path: String,
        op: &'static str,
        field_type: String,
    },
    /// Two mutations touch the same path (or a path and one of its parents) with
    /// different operators.
    #[error("conflicting update operators on `{path}`")]
    ConflictingUpdate { path: String },
    /// An update without any mutation was submitted.
    #[error("update expression is empty")]
    EmptyUpdate,
}

/// A stored document could not be converted into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeserializeError {
    /// A non-optional field has no value in the document.
    #[error("missing required field `{0}`")]
    MissingRequiredField(String),
    /// A value is present but of the wrong kind.
    #[error("type mismatch on `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },
}

impl DeserializeError {
    /// Prefixes the reported path with the key of the enclosing document.
    pub fn within(self, parent: &str) -> Self {
        match self {
            DeserializeError::MissingRequiredField(path) => {
                DeserializeError::MissingRequiredField(format!("{parent}.{path}"))
            }
            DeserializeError::TypeMismatch { path, expected, found } => {
                DeserializeError::TypeMismatch {
                    path: format!("{parent}.{path}"),
                    expected,
                    found,
                }
            }
        }
    }

    /// Returns the dotted path of the offending field.
    pub fn path(&self) -> &str {
        match self {
            DeserializeError::MissingRequiredField(path) => path,
            DeserializeError::TypeMismatch { path, .. } => path,
        }
    }
}

/// Represents all failures reported by a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given identifier already exists in the collection.
    /// The first argument is the identifier, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// The document has an invalid structure for the requested operation.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The update cannot be applied to the stored document.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::InvalidDocument(err.to_string())
    }
}

/// Errors returned by typed persistence operations.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    /// The record type has no declared collection and was not bound explicitly.
    #[error("record type {0} is not bound to a collection")]
    Unbound(&'static str),
    /// The operation needs the instance's identifier, which is unset.
    #[error("{0} instance has no identifier")]
    MissingIdentifier(&'static str),
    /// JSON conversion failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for typed persistence operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl From<SerdeJsonError> for ModelError {
    fn from(err: SerdeJsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
