//! Mapping between Rust field types and BSON values.
//!
//! [`FieldValue`] is implemented for every supported member type. It gives the
//! registry the semantic [`FieldType`] of a member, converts values to and from
//! [`Bson`], and picks the typed path a member exposes through [`Record::fields`].
//!
//! [`Record::fields`]: crate::record::Record::fields

use bson::{Binary, Bson, oid::ObjectId, spec::BinarySubtype};
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use uuid::Uuid;

use crate::{
    error::DeserializeError,
    field::{Field, FieldType, bson_kind},
};

/// A type that can be stored in a record field.
pub trait FieldValue: Sized + Send + Sync + 'static {
    /// The type of operands used when comparing against this field.
    ///
    /// `Option<T>` and `Vec<T>` compare against `T`.
    type Query: FieldValue;

    /// The typed path exposed for a member of this type.
    type Path<Root>;

    /// The semantic type recorded in the registry.
    fn field_type() -> FieldType;

    /// Converts the value to BSON, `None` meaning the key is omitted.
    fn to_bson(&self) -> Option<Bson>;

    /// Converts a possibly missing document value. `key` is the dotted path used
    /// in errors.
    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError>;

    /// Builds the typed path for a member stored at `path`.
    fn path_at<Root>(path: String) -> Self::Path<Root>;
}

/// Marker for values that are always present once stored.
///
/// `Option<T>` and `Vec<T>` only accept `Required` parameters, so three-state
/// members such as `Option<Option<T>>` or `Vec<Option<T>>` do not compile.
pub trait Required: FieldValue {}

/// Marker for single values: every supported type except sequences and records.
///
/// Gates the ordering updates `min` and `max` on typed paths.
pub trait Scalar: FieldValue {}

/// Marker for fields accepting arithmetic updates.
pub trait Numeric: Scalar {}

/// Types usable as the identifier of a model.
pub trait Identifier: Required + Clone + Debug + PartialEq {
    /// Generates a fresh identifier client-side.
    ///
    /// Types returning `None` must be set by the caller before inserting.
    fn generate() -> Option<Self> {
        None
    }
}

pub(crate) fn missing(key: &str) -> DeserializeError {
    DeserializeError::MissingRequiredField(key.to_string())
}

pub(crate) fn mismatch<V: FieldValue>(key: &str, value: &Bson) -> DeserializeError {
    DeserializeError::TypeMismatch {
        path: key.to_string(),
        expected: V::field_type().to_string(),
        found: bson_kind(value),
    }
}

impl FieldValue for i32 {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::Int32
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::Int32(*self))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::Int32(n)) => Ok(*n),
            Some(bson @ Bson::Int64(n)) => {
                i32::try_from(*n).map_err(|_| mismatch::<Self>(key, bson))
            }
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl FieldValue for i64 {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::Int64
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::Int64(*self))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::Int64(n)) => Ok(*n),
            Some(Bson::Int32(n)) => Ok(i64::from(*n)),
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl FieldValue for f64 {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::Double
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::Double(*self))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::Double(n)) => Ok(*n),
            Some(Bson::Int32(n)) => Ok(f64::from(*n)),
            Some(Bson::Int64(n)) => Ok(*n as f64),
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl FieldValue for String {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::String
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::String(self.clone()))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::String(s)) => Ok(s.clone()),
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl FieldValue for bool {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::Boolean
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::Boolean(*self))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::Boolean(b)) => Ok(*b),
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl FieldValue for ObjectId {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::ObjectId
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::ObjectId(*self))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::ObjectId(id)) => Ok(*id),
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl FieldValue for Uuid {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::Uuid
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: self.as_bytes().to_vec(),
        }))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(bson @ Bson::Binary(binary)) if binary.subtype == BinarySubtype::Uuid => {
                Uuid::from_slice(&binary.bytes).map_err(|_| mismatch::<Self>(key, bson))
            }
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl FieldValue for bson::DateTime {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::DateTime
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::DateTime(*self))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::DateTime(dt)) => Ok(*dt),
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

// Stored with millisecond precision; sub-millisecond parts are truncated.
impl FieldValue for DateTime<Utc> {
    type Query = Self;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::DateTime
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::DateTime(bson::DateTime::from_chrono(*self)))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::DateTime(dt)) => Ok(dt.to_chrono()),
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl<T: Required> FieldValue for Option<T> {
    type Query = T::Query;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::Optional(Box::new(T::field_type()))
    }

    fn to_bson(&self) -> Option<Bson> {
        self.as_ref().and_then(FieldValue::to_bson)
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(value) => T::from_bson(Some(value), key).map(Some),
            None => Ok(None),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl<T: Required> FieldValue for Vec<T> {
    type Query = T::Query;
    type Path<Root> = Field<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::Array(Box::new(T::field_type()))
    }

    fn to_bson(&self) -> Option<Bson> {
        Some(Bson::Array(
            self.iter().filter_map(FieldValue::to_bson).collect(),
        ))
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        match value {
            Some(Bson::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| T::from_bson(Some(item), &format!("{key}.{index}")))
                .collect(),
            Some(other) => Err(mismatch::<Self>(key, other)),
            None => Err(missing(key)),
        }
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Field::new(path)
    }
}

impl Required for i32 {}
impl Required for i64 {}
impl Required for f64 {}
impl Required for String {}
impl Required for bool {}
impl Required for ObjectId {}
impl Required for Uuid {}
impl Required for bson::DateTime {}
impl Required for DateTime<Utc> {}
impl<T: Required> Required for Vec<T> {}

impl Scalar for i32 {}
impl Scalar for i64 {}
impl Scalar for f64 {}
impl Scalar for String {}
impl Scalar for bool {}
impl Scalar for ObjectId {}
impl Scalar for Uuid {}
impl Scalar for bson::DateTime {}
impl Scalar for DateTime<Utc> {}
impl<T: Required + Scalar> Scalar for Option<T> {}

impl Numeric for i32 {}
impl Numeric for i64 {}
impl Numeric for f64 {}
impl<T: Required + Numeric> Numeric for Option<T> {}

impl Identifier for ObjectId {
    fn generate() -> Option<Self> {
        Some(ObjectId::new())
    }
}

impl Identifier for Uuid {
    fn generate() -> Option<Self> {
        Some(Uuid::new_v4())
    }
}

impl Identifier for String {}
impl Identifier for i32 {}
impl Identifier for i64 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen_but_floats_do_not_narrow() {
        assert_eq!(i64::from_bson(Some(&Bson::Int32(3)), "a"), Ok(3));
        assert_eq!(f64::from_bson(Some(&Bson::Int64(3)), "a"), Ok(3.0));
        assert_eq!(i32::from_bson(Some(&Bson::Int64(3)), "a"), Ok(3));
        assert!(i32::from_bson(Some(&Bson::Int64(i64::MAX)), "a").is_err());
        assert_eq!(
            i32::from_bson(Some(&Bson::Double(3.0)), "a"),
            Err(DeserializeError::TypeMismatch {
                path: "a".to_string(),
                expected: "int32".to_string(),
                found: "double",
            })
        );
    }

    #[test]
    fn optional_values_are_absent_or_present() {
        assert_eq!(Option::<i32>::from_bson(None, "a"), Ok(None));
        assert_eq!(Option::<i32>::from_bson(Some(&Bson::Int32(1)), "a"), Ok(Some(1)));
        assert!(Option::<i32>::from_bson(Some(&Bson::Null), "a").is_err());
        assert_eq!(None::<i32>.to_bson(), None);
        assert_eq!(i32::from_bson(None, "a"), Err(missing("a")));
    }

    #[test]
    fn sequence_errors_carry_the_element_position() {
        let value = Bson::Array(vec![Bson::Int32(1), Bson::String("x".into())]);
        let err = Vec::<i32>::from_bson(Some(&value), "values").unwrap_err();

        assert_eq!(err.path(), "values.1");
    }

    #[test]
    fn uuid_is_stored_as_binary_subtype_4() {
        let id = Uuid::new_v4();
        let bson = id.to_bson().unwrap();

        assert!(matches!(&bson, Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid));
        assert_eq!(Uuid::from_bson(Some(&bson), "id"), Ok(id));
    }

    #[test]
    fn only_generating_identifiers_produce_values() {
        assert!(ObjectId::generate().is_some());
        assert!(Uuid::generate().is_some());
        assert!(String::generate().is_none());
        assert!(i64::generate().is_none());
    }

    proptest::proptest! {
        #[test]
        fn narrowing_accepts_exactly_the_int32_range(n in proptest::prelude::any::<i64>()) {
            let decoded = i32::from_bson(Some(&Bson::Int64(n)), "n");

            proptest::prop_assert_eq!(decoded.is_ok(), i32::try_from(n).is_ok());
        }

        #[test]
        fn sequences_report_the_failing_position(
            values in proptest::collection::vec(proptest::prelude::any::<i32>(), 0..8),
            position in 0..8_usize,
        ) {
            let mut items = values.iter().map(|value| Bson::Int32(*value)).collect::<Vec<_>>();
            let position = position.min(items.len());
            items.insert(position, Bson::String("bad".into()));

            let err = Vec::<i32>::from_bson(Some(&Bson::Array(items)), "values").unwrap_err();

            proptest::prop_assert_eq!(err.path(), format!("values.{position}"));
        }
    }
}
