//! Hand-registered records shared by the unit tests of this crate.

use bson::{Bson, Document, oid::ObjectId};
use std::sync::OnceLock;

use crate::{
    codec::{decode_embedded, decode_field, encode_embedded, encode_field},
    error::DeserializeError,
    field::{Embedded, Field, FieldType, ID_KEY, Schema, join_path},
    record::{Model, Record},
    value::{FieldValue, Required},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Point {
    pub x: Option<i32>,
    pub y: Option<f64>,
}

pub(crate) struct PointFields<Root> {
    pub x: Field<Root, Option<i32>>,
    pub y: Field<Root, Option<f64>>,
}

impl Record for Point {
    type Fields<Root> = PointFields<Root>;

    fn schema() -> &'static Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();

        SCHEMA.get_or_init(|| {
            Schema::builder("Point")
                .field::<Option<i32>>("x", "x")
                .field::<Option<f64>>("y", "y")
                .build()
                .expect("Point registers")
        })
    }

    fn fields_at<Root>(prefix: &str) -> Self::Fields<Root> {
        PointFields {
            x: <Option<i32> as FieldValue>::path_at(join_path(prefix, "x")),
            y: <Option<f64> as FieldValue>::path_at(join_path(prefix, "y")),
        }
    }

    fn to_document(&self) -> Document {
        let mut document = Document::new();
        encode_field(&mut document, "x", &self.x);
        encode_field(&mut document, "y", &self.y);
        document
    }

    fn from_document(document: &Document) -> Result<Self, DeserializeError> {
        Ok(Self {
            x: decode_field(document, "x")?,
            y: decode_field(document, "y")?,
        })
    }
}

impl FieldValue for Point {
    type Query = Self;
    type Path<Root> = Embedded<Root, Self>;

    fn field_type() -> FieldType {
        FieldType::Embedded(Self::schema())
    }

    fn to_bson(&self) -> Option<Bson> {
        encode_embedded(self)
    }

    fn from_bson(value: Option<&Bson>, key: &str) -> Result<Self, DeserializeError> {
        decode_embedded(value, key)
    }

    fn path_at<Root>(path: String) -> Self::Path<Root> {
        Embedded::new(path)
    }
}

impl Required for Point {}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Sample {
    pub id: Option<ObjectId>,
    pub count: i32,
    pub name: String,
    pub score: Option<f64>,
    pub tags: Vec<String>,
    pub point: Point,
    pub history: Vec<Point>,
}

pub(crate) struct SampleFields<Root> {
    pub id: Field<Root, ObjectId>,
    pub count: Field<Root, i32>,
    pub name: Field<Root, String>,
    pub score: Field<Root, Option<f64>>,
    pub tags: Field<Root, Vec<String>>,
    pub point: Embedded<Root, Point>,
    pub history: Field<Root, Vec<Point>>,
}

impl Record for Sample {
    type Fields<Root> = SampleFields<Root>;

    fn schema() -> &'static Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();

        SCHEMA.get_or_init(|| {
            Schema::builder("Sample")
                .id::<ObjectId>("id")
                .field::<i32>("count", "count")
                .field::<String>("name", "label")
                .field::<Option<f64>>("score", "score")
                .field::<Vec<String>>("tags", "tags")
                .field::<Point>("point", "point")
                .field::<Vec<Point>>("history", "history")
                .build()
                .expect("Sample registers")
        })
    }

    fn fields_at<Root>(prefix: &str) -> Self::Fields<Root> {
        SampleFields {
            id: Field::new(join_path(prefix, ID_KEY)),
            count: <i32 as FieldValue>::path_at(join_path(prefix, "count")),
            name: <String as FieldValue>::path_at(join_path(prefix, "label")),
            score: <Option<f64> as FieldValue>::path_at(join_path(prefix, "score")),
            tags: <Vec<String> as FieldValue>::path_at(join_path(prefix, "tags")),
            point: <Point as FieldValue>::path_at(join_path(prefix, "point")),
            history: <Vec<Point> as FieldValue>::path_at(join_path(prefix, "history")),
        }
    }

    fn to_document(&self) -> Document {
        let mut document = Document::new();
        encode_field(&mut document, ID_KEY, &self.id);
        encode_field(&mut document, "count", &self.count);
        encode_field(&mut document, "label", &self.name);
        encode_field(&mut document, "score", &self.score);
        encode_field(&mut document, "tags", &self.tags);
        encode_field(&mut document, "point", &self.point);
        encode_field(&mut document, "history", &self.history);
        document
    }

    fn from_document(document: &Document) -> Result<Self, DeserializeError> {
        Ok(Self {
            id: decode_field(document, ID_KEY)?,
            count: decode_field(document, "count")?,
            name: decode_field(document, "label")?,
            score: decode_field(document, "score")?,
            tags: decode_field(document, "tags")?,
            point: decode_field(document, "point")?,
            history: decode_field(document, "history")?,
        })
    }
}

impl Model for Sample {
    type Id = ObjectId;

    fn collection_name() -> Option<&'static str> {
        Some("samples")
    }

    fn id(&self) -> Option<&Self::Id> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Self::Id) {
        self.id = Some(id);
    }
}
