//! Core traits for record types and their conversion to documents.
//!
//! [`Record`] is implemented by every struct that can be encoded as a document,
//! whether it is stored on its own or embedded in another record. [`Model`] adds
//! the identifier and the default collection for records persisted in their own
//! collection.
//!
//! Both traits are normally derived:
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, Record)]
//! pub struct Point {
//!     pub x: i32,
//!     pub y: Option<f64>,
//! }
//!
//! #[derive(Debug, Clone, PartialEq, Record)]
//! #[record(collection = "shapes")]
//! pub struct Shape {
//!     #[record(id)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//!     pub origin: Point,
//! }
//!
//! let filter = Shape::fields().origin.x.gt(3);
//! ```

use bson::Document;
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{DeserializeError, ModelResult},
    field::Schema,
    value::Identifier,
};

/// A struct that can be encoded as a document.
pub trait Record: Sized + Send + Sync + 'static {
    /// Typed paths to every field, rooted at the record `Root`.
    type Fields<Root>;

    /// The registry of this type, built on first use.
    fn schema() -> &'static Schema;

    /// Typed paths to the fields of this record stored under `prefix`.
    fn fields_at<Root>(prefix: &str) -> Self::Fields<Root>;

    /// Typed paths to the fields of this record.
    fn fields() -> Self::Fields<Self> {
        Self::fields_at("")
    }

    /// Encodes every present field in declaration order. Absent optional fields are
    /// omitted.
    fn to_document(&self) -> Document;

    /// Decodes a document. Unknown keys are ignored.
    fn from_document(document: &Document) -> Result<Self, DeserializeError>;
}

/// A record persisted in its own collection under an identifier.
pub trait Model: Record {
    /// The identifier type, stored under `_id`.
    type Id: Identifier;

    /// The collection declared for this type, if any.
    fn collection_name() -> Option<&'static str> {
        None
    }

    /// The identifier, `None` until the instance is first inserted.
    fn id(&self) -> Option<&Self::Id>;

    /// Populates the identifier.
    fn set_id(&mut self, id: Self::Id);
}

/// JSON conversions, available on every [`Record`].
///
/// Identifiers, dates and binary values use MongoDB extended JSON.
pub trait RecordExt: Record {
    /// Converts this record to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> ModelResult<Value>;

    /// Creates a record from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a document or does not match the record.
    fn from_json(value: Value) -> ModelResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_json(&self) -> ModelResult<Value> {
        Ok(to_value(self.to_document())?)
    }

    fn from_json(value: Value) -> ModelResult<Self> {
        let document: Document = from_value(value)?;

        Ok(Self::from_document(&document)?)
    }
}
