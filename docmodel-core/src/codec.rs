//! Field-level encoding helpers shared by generated and hand-written [`Record`]
//! implementations.

use bson::{Bson, Document};

use crate::{
    error::DeserializeError,
    field::bson_kind,
    record::Record,
    value::{FieldValue, missing},
};

/// Writes `value` under `key`, omitting the key when the value is absent.
pub fn encode_field<V: FieldValue>(document: &mut Document, key: &str, value: &V) {
    if let Some(value) = value.to_bson() {
        document.insert(key, value);
    }
}

/// Reads the field stored under `key`.
pub fn decode_field<V: FieldValue>(document: &Document, key: &str) -> Result<V, DeserializeError> {
    V::from_bson(document.get(key), key)
}

/// Decodes a nested record. Errors raised inside the sub-document are reported
/// with `key` prefixed to their path.
pub fn decode_embedded<R: Record>(value: Option<&Bson>, key: &str) -> Result<R, DeserializeError> {
    match value {
        Some(Bson::Document(document)) => {
            R::from_document(document).map_err(|err| err.within(key))
        }
        Some(other) => Err(DeserializeError::TypeMismatch {
            path: key.to_string(),
            expected: format!("embedded<{}>", R::schema().name()),
            found: bson_kind(other),
        }),
        None => Err(missing(key)),
    }
}

/// Encodes a nested record as a sub-document.
pub fn encode_embedded<R: Record>(record: &R) -> Option<Bson> {
    Some(Bson::Document(record.to_document()))
}
