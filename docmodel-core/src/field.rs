//! Field descriptor registry and typed field paths.
//!
//! Every record type owns one [`Schema`]: an ordered list of [`FieldDescriptor`]s,
//! one per declared data field, plus the identifier descriptor when the record is a
//! [`Model`](crate::record::Model). Nested records are referenced through
//! [`FieldType::Embedded`], so dotted paths such as `outer.inner` can be resolved
//! against the registry without any reflection.
//!
//! Schemas are built once per type, on first use, through [`SchemaBuilder`]. The
//! `#[derive(Record)]` macro emits that registration; it can also be written by hand:
//!
//! ```ignore
//! use docmodel::field::Schema;
//!
//! let schema = Schema::builder("Point")
//!     .field::<i32>("x", "x")
//!     .field::<Option<f64>>("y", "y")
//!     .build()?;
//!
//! assert_eq!(schema.resolve("y").unwrap().to_string(), "optional<double>");
//! ```
//!
//! [`Field`] is the typed counterpart of a path: it remembers the record the path
//! starts from and the Rust type stored at the end of it, which is what lets the
//! expression builder reject mistyped values at compile time.

use bson::{Bson, Document, spec::BinarySubtype};
use std::{fmt, marker::PhantomData, ops::Deref};

use crate::{
    error::{DeserializeError, RegistrationError},
    record::Record,
    value::{FieldValue, Identifier},
};

/// Key under which the identifier of a model is stored.
pub const ID_KEY: &str = "_id";

/// The semantic type of a field.
#[derive(Clone)]
pub enum FieldType {
    Int32,
    Int64,
    Double,
    String,
    Boolean,
    ObjectId,
    Uuid,
    DateTime,
    /// The field may be absent from the document.
    Optional(Box<FieldType>),
    /// A sequence of values of the inner type.
    Array(Box<FieldType>),
    /// A nested record stored as a sub-document.
    Embedded(&'static Schema),
}

impl FieldType {
    /// Returns the type with any optional wrapper removed.
    pub fn required(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner.required(),
            other => other,
        }
    }

    /// Whether the field may be absent.
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// Whether the field holds an integer or floating point number.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.required(),
            FieldType::Int32 | FieldType::Int64 | FieldType::Double
        )
    }

    /// Whether string operators (prefix, suffix, substring) apply to the field,
    /// either directly or to the elements of a sequence.
    pub fn is_textual(&self) -> bool {
        match self.required() {
            FieldType::String => true,
            FieldType::Array(element) => element.is_textual(),
            _ => false,
        }
    }

    /// Returns the element type of a sequence field.
    pub fn element(&self) -> Option<&FieldType> {
        match self.required() {
            FieldType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Returns the schema of the nested record reachable through this field,
    /// looking through optional and sequence wrappers.
    pub fn nested_schema(&self) -> Option<&'static Schema> {
        match self.required() {
            FieldType::Embedded(schema) => Some(schema),
            FieldType::Array(element) => element.nested_schema(),
            _ => None,
        }
    }

    /// Checks a possibly missing document value against this type.
    ///
    /// `path` is used for error reporting only.
    pub fn check(&self, value: Option<&Bson>, path: &str) -> Result<(), DeserializeError> {
        match (self, value) {
            (FieldType::Optional(_), None) => Ok(()),
            (_, None) => Err(DeserializeError::MissingRequiredField(path.to_string())),
            (_, Some(value)) => self.check_present(value, path),
        }
    }

    fn check_present(&self, value: &Bson, path: &str) -> Result<(), DeserializeError> {
        let matches = match (self, value) {
            (FieldType::Optional(inner), value) => return inner.check_present(value, path),
            (FieldType::Array(element), Bson::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    element.check_present(item, &format!("{path}.{index}"))?;
                }
                return Ok(());
            }
            (FieldType::Embedded(schema), Bson::Document(document)) => {
                return schema
                    .validate(document)
                    .map_err(|err| err.within(path));
            }
            (FieldType::Int32, Bson::Int32(_)) => true,
            (FieldType::Int32, Bson::Int64(n)) => i32::try_from(*n).is_ok(),
            (FieldType::Int64, Bson::Int32(_) | Bson::Int64(_)) => true,
            (FieldType::Double, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_)) => true,
            (FieldType::String, Bson::String(_)) => true,
            (FieldType::Boolean, Bson::Boolean(_)) => true,
            (FieldType::ObjectId, Bson::ObjectId(_)) => true,
            (FieldType::DateTime, Bson::DateTime(_)) => true,
            (FieldType::Uuid, Bson::Binary(binary)) => {
                binary.subtype == BinarySubtype::Uuid && binary.bytes.len() == 16
            }
            _ => false,
        };

        if matches {
            Ok(())
        } else {
            Err(DeserializeError::TypeMismatch {
                path: path.to_string(),
                expected: self.to_string(),
                found: bson_kind(value),
            })
        }
    }

    /// Whether `value` can be stored in a field of this type.
    pub fn check_value(&self, value: &Bson) -> bool {
        self.check_present(value, "").is_ok()
    }

    /// Whether `value` can be compared against a field of this type.
    ///
    /// Sequence fields accept either one element (matches when any element matches)
    /// or a whole sequence.
    pub fn check_operand(&self, value: &Bson) -> bool {
        match self {
            FieldType::Optional(inner) => inner.check_operand(value),
            FieldType::Array(element) => element.check_operand(value) || self.check_value(value),
            _ => self.check_value(value),
        }
    }
}

impl PartialEq for FieldType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldType::Optional(a), FieldType::Optional(b)) => a == b,
            (FieldType::Array(a), FieldType::Array(b)) => a == b,
            (FieldType::Embedded(a), FieldType::Embedded(b)) => std::ptr::eq(*a, *b),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int32 => f.write_str("int32"),
            FieldType::Int64 => f.write_str("int64"),
            FieldType::Double => f.write_str("double"),
            FieldType::String => f.write_str("string"),
            FieldType::Boolean => f.write_str("bool"),
            FieldType::ObjectId => f.write_str("objectId"),
            FieldType::Uuid => f.write_str("uuid"),
            FieldType::DateTime => f.write_str("date"),
            FieldType::Optional(inner) => write!(f, "optional<{inner}>"),
            FieldType::Array(inner) => write!(f, "array<{inner}>"),
            FieldType::Embedded(schema) => write!(f, "embedded<{}>", schema.name()),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Optional(inner) => f.debug_tuple("Optional").field(inner).finish(),
            FieldType::Array(inner) => f.debug_tuple("Array").field(inner).finish(),
            FieldType::Embedded(schema) => f.debug_tuple("Embedded").field(&schema.name()).finish(),
            other => write!(f, "{other}"),
        }
    }
}

/// Static metadata for one declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: &'static str,
    key: &'static str,
    field_type: FieldType,
}

impl FieldDescriptor {
    /// The member name in the Rust declaration.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The document key the field is stored under.
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// The semantic type of the field.
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }
}

/// The registry of one record type.
#[derive(Debug)]
pub struct Schema {
    name: &'static str,
    id: Option<FieldDescriptor>,
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Starts the registration of a record type.
    pub fn builder(name: &'static str) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// The name of the record type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The identifier descriptor, stored under [`ID_KEY`].
    pub fn id(&self) -> Option<&FieldDescriptor> {
        self.id.as_ref()
    }

    /// Data field descriptors in declaration order. The identifier is not included.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a top-level descriptor by document key, identifier included.
    pub fn descriptor(&self, key: &str) -> Option<&FieldDescriptor> {
        self.id
            .iter()
            .chain(self.fields.iter())
            .find(|descriptor| descriptor.key == key)
    }

    /// Resolves a dotted path to the type of the field it designates.
    ///
    /// Paths may cross nested records, optional wrappers and sequences; a segment
    /// after a sequence addresses a field of any element, a numeric segment
    /// addresses one position.
    pub fn resolve(&self, path: &str) -> Option<&FieldType> {
        let mut segments = path.split('.');
        let mut current = &self.descriptor(segments.next()?)?.field_type;

        for segment in segments {
            current = step(current, segment)?;
        }

        Some(current)
    }

    /// Flattens the registry into fully qualified leaf paths.
    ///
    /// Nested records are expanded recursively; every other field, sequences
    /// included, is a leaf.
    pub fn leaves(&self) -> Vec<(String, &FieldType)> {
        let mut leaves = Vec::new();

        for descriptor in &self.fields {
            collect_leaves(descriptor.key.to_string(), &descriptor.field_type, &mut leaves);
        }

        leaves
    }

    /// Checks that a document can be decoded into this record type.
    pub fn validate(&self, document: &Document) -> Result<(), DeserializeError> {
        if let Some(id) = &self.id {
            if let Some(value) = document.get(id.key) {
                id.field_type.check(Some(value), id.key)?;
            }
        }

        for descriptor in &self.fields {
            descriptor
                .field_type
                .check(document.get(descriptor.key), descriptor.key)?;
        }

        Ok(())
    }
}

fn step<'a>(field_type: &'a FieldType, segment: &str) -> Option<&'a FieldType> {
    match field_type {
        FieldType::Optional(inner) => step(inner, segment),
        FieldType::Array(element) if segment.parse::<usize>().is_ok() => Some(element),
        FieldType::Array(element) => step(element, segment),
        FieldType::Embedded(schema) => schema
            .descriptor(segment)
            .map(|descriptor| &descriptor.field_type),
        _ => None,
    }
}

fn collect_leaves<'a>(path: String, field_type: &'a FieldType, out: &mut Vec<(String, &'a FieldType)>) {
    match field_type.required() {
        FieldType::Embedded(schema) => {
            for descriptor in &schema.fields {
                collect_leaves(join_path(&path, descriptor.key), &descriptor.field_type, out);
            }
        }
        _ => out.push((path, field_type)),
    }
}

/// Builder used to register a record type.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: &'static str,
    id: Option<FieldDescriptor>,
    fields: Vec<FieldDescriptor>,
    error: Option<RegistrationError>,
}

impl SchemaBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            id: None,
            fields: Vec::new(),
            error: None,
        }
    }

    /// Declares the identifier field. Its key is always [`ID_KEY`].
    pub fn id<I: Identifier>(mut self, name: &'static str) -> Self {
        if self.id.is_some() {
            self.fail(RegistrationError::DuplicateIdentifier { record: self.name });
        } else {
            self.id = Some(FieldDescriptor {
                name,
                key: ID_KEY,
                field_type: I::field_type(),
            });
        }

        self
    }

    /// Declares a data field stored under `key`.
    pub fn field<V: FieldValue>(mut self, name: &'static str, key: &'static str) -> Self {
        let record = self.name;

        let reason = if key.is_empty() {
            Some("key is empty")
        } else if key.contains('.') {
            Some("key contains '.'")
        } else if key.starts_with('$') {
            Some("key starts with '$'")
        } else {
            None
        };

        if let Some(reason) = reason {
            self.fail(RegistrationError::InvalidKey { record, key, reason });
        } else if key == ID_KEY {
            self.fail(RegistrationError::ReservedKey { record, name });
        } else if self.fields.iter().any(|field| field.key == key) {
            self.fail(RegistrationError::DuplicateKey { record, key });
        } else {
            self.fields.push(FieldDescriptor {
                name,
                key,
                field_type: V::field_type(),
            });
        }

        self
    }

    /// Finishes the registration, reporting the first problem encountered.
    pub fn build(self) -> Result<Schema, RegistrationError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(Schema {
                name: self.name,
                id: self.id,
                fields: self.fields,
            }),
        }
    }

    fn fail(&mut self, err: RegistrationError) {
        self.error.get_or_insert(err);
    }
}

/// Joins a key onto a dotted prefix.
pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Short name of the kind of a BSON value, used in error messages.
pub fn bson_kind(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Binary(_) => "binary",
        Bson::Timestamp(_) => "timestamp",
        Bson::Decimal128(_) => "decimal128",
        _ => "other",
    }
}

/// A typed path from the record `Root` to a value of type `V`.
///
/// Paths are produced by [`Record::fields`] and consumed by the comparison and
/// mutation methods defined in [`query`](crate::query) and [`update`](crate::update).
pub struct Field<Root, V> {
    path: String,
    marker: PhantomData<fn() -> (Root, V)>,
}

impl<Root, V> Field<Root, V> {
    /// Creates a path without checking it against the registry.
    ///
    /// Generated code and manual registrations use this; application code should
    /// obtain paths from [`Record::fields`].
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            marker: PhantomData,
        }
    }

    /// The dotted document path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<Root, V> Clone for Field<Root, V> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<Root, V> fmt::Debug for Field<Root, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.path).finish()
    }
}

impl<Root, V: Record> Field<Root, Option<V>> {
    /// Paths into the optional nested record.
    pub fn fields(&self) -> V::Fields<Root> {
        V::fields_at(&self.path)
    }
}

impl<Root, V: Record> Field<Root, Vec<V>> {
    /// Paths into the elements of the sequence ("any element" semantics).
    pub fn elements(&self) -> V::Fields<Root> {
        V::fields_at(&self.path)
    }
}

/// Path to a nested record: dereferences to the nested record's own paths and
/// exposes the whole sub-document through [`Embedded::field`].
pub struct Embedded<Root, V: Record> {
    field: Field<Root, V>,
    fields: V::Fields<Root>,
}

impl<Root, V: Record> Embedded<Root, V> {
    pub fn new(path: String) -> Self {
        let fields = V::fields_at(&path);

        Self {
            field: Field::new(path),
            fields,
        }
    }

    /// The path of the sub-document itself.
    pub fn field(&self) -> &Field<Root, V> {
        &self.field
    }
}

impl<Root, V: Record> Deref for Embedded<Root, V> {
    type Target = V::Fields<Root>;

    fn deref(&self) -> &Self::Target {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Point, Sample};

    #[test]
    fn schema_keeps_declaration_order_and_tracks_id_separately() {
        let schema = Sample::schema();
        let keys = schema
            .fields()
            .iter()
            .map(FieldDescriptor::key)
            .collect::<Vec<_>>();

        assert_eq!(keys, vec!["count", "label", "score", "tags", "point", "history"]);
        assert_eq!(schema.id().map(FieldDescriptor::key), Some(ID_KEY));
        assert_eq!(schema.id().map(|id| id.field_type().clone()), Some(FieldType::ObjectId));
        assert_eq!(schema.descriptor("label").map(FieldDescriptor::name), Some("name"));
    }

    #[test]
    fn resolve_walks_nested_optional_and_sequence_fields() {
        let schema = Sample::schema();

        assert_eq!(schema.resolve("count"), Some(&FieldType::Int32));
        assert_eq!(schema.resolve("point.x"), Some(&FieldType::Optional(Box::new(FieldType::Int32))));
        assert_eq!(schema.resolve("history.y"), Some(&FieldType::Optional(Box::new(FieldType::Double))));
        assert_eq!(schema.resolve("history.0.x"), Some(&FieldType::Optional(Box::new(FieldType::Int32))));
        assert_eq!(schema.resolve("tags.0"), Some(&FieldType::String));
        assert_eq!(schema.resolve("point.z"), None);
        assert_eq!(schema.resolve("count.x"), None);
        assert_eq!(schema.resolve("name"), None);
    }

    #[test]
    fn leaves_expand_nested_records() {
        let leaves = Sample::schema()
            .leaves()
            .into_iter()
            .map(|(path, _)| path)
            .collect::<Vec<_>>();

        assert_eq!(
            leaves,
            vec!["count", "label", "score", "tags", "point.x", "point.y", "history"]
        );
    }

    #[test]
    fn builder_rejects_bad_keys() {
        let err = Schema::builder("Broken")
            .field::<i32>("a", "a")
            .field::<i32>("b", "a")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistrationError::DuplicateKey { record: "Broken", key: "a" });

        let err = Schema::builder("Broken")
            .field::<i32>("a", "a.b")
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidKey { key: "a.b", .. }));

        let err = Schema::builder("Broken")
            .field::<i32>("a", "$a")
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidKey { key: "$a", .. }));

        let err = Schema::builder("Broken")
            .field::<i32>("id", "_id")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistrationError::ReservedKey { record: "Broken", name: "id" });

        let err = Schema::builder("Broken")
            .id::<String>("id")
            .id::<String>("other")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistrationError::DuplicateIdentifier { record: "Broken" });
    }

    #[test]
    fn check_reports_missing_and_mismatched_values() {
        let schema = Point::schema();
        let optional_int = schema.resolve("x").unwrap();

        assert!(optional_int.check(None, "x").is_ok());
        assert!(optional_int.check(Some(&Bson::Int32(1)), "x").is_ok());
        assert_eq!(
            optional_int.check(Some(&Bson::Null), "x"),
            Err(DeserializeError::TypeMismatch {
                path: "x".to_string(),
                expected: "int32".to_string(),
                found: "null",
            })
        );
        assert_eq!(
            FieldType::Int64.check(None, "a"),
            Err(DeserializeError::MissingRequiredField("a".to_string()))
        );
    }

    #[test]
    fn operands_widen_integers_but_never_narrow_floats() {
        assert!(FieldType::Double.check_operand(&Bson::Int32(1)));
        assert!(FieldType::Int64.check_operand(&Bson::Int32(1)));
        assert!(FieldType::Int32.check_operand(&Bson::Int64(7)));
        assert!(!FieldType::Int32.check_operand(&Bson::Int64(i64::MAX)));
        assert!(!FieldType::Int32.check_operand(&Bson::Double(1.0)));

        let tags = FieldType::Array(Box::new(FieldType::String));
        assert!(tags.check_operand(&Bson::String("a".into())));
        assert!(tags.check_operand(&Bson::Array(vec![Bson::String("a".into())])));
        assert!(!tags.check_operand(&Bson::Array(vec![Bson::Int32(1)])));
        assert!(!tags.check_value(&Bson::String("a".into())));
    }

    #[test]
    fn typed_paths_follow_nesting() {
        let fields = Sample::fields();

        assert_eq!(fields.count.path(), "count");
        assert_eq!(fields.name.path(), "label");
        assert_eq!(fields.point.x.path(), "point.x");
        assert_eq!(fields.point.field().path(), "point");
        assert_eq!(fields.history.elements().y.path(), "history.y");
    }

    #[test]
    fn display_names_nested_types() {
        let history = Sample::schema().resolve("history").unwrap();

        assert_eq!(history.to_string(), "array<embedded<Point>>");
        assert_eq!(format!("{history:?}"), "Array(Embedded(\"Point\"))");
    }
}
