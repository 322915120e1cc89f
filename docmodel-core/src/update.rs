//! Update expressions.
//!
//! An update is an ordered list of per-path mutation leaves. Typed paths produce them:
//!
//! ```ignore
//! let f = Player::fields();
//! let update = f.score.inc(10).and(f.stats.last_seen.set(now))?;
//! ```
//!
//! A path appears at most once per operator. Repeating a (path, operator) pair keeps the
//! last value; mixing operators on one path, or touching both a sub-document and one of
//! its fields, is rejected with [`ExpressionError::ConflictingUpdate`].

use bson::{Bson, Document};
use std::{fmt, marker::PhantomData};

use crate::{
    error::ExpressionError,
    field::{Field, FieldType, ID_KEY, Schema, join_path},
    query::{resolve, type_mismatch},
    record::Record,
    value::{FieldValue, Numeric, Required, Scalar},
};

/// Mutation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOp {
    /// Replaces the value.
    Set,
    /// Removes the key.
    Unset,
    /// Adds to a number.
    Inc,
    /// Multiplies a number.
    Mul,
    /// Keeps the smaller of the stored and given values.
    Min,
    /// Keeps the larger of the stored and given values.
    Max,
    /// Appends to a sequence.
    Push,
    /// Removes every matching element from a sequence.
    Pull,
    /// Sets the value only when the update inserts a new document.
    SetOnInsert,
}

impl UpdateOp {
    /// Operator name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            UpdateOp::Set => "set",
            UpdateOp::Unset => "unset",
            UpdateOp::Inc => "inc",
            UpdateOp::Mul => "mul",
            UpdateOp::Min => "min",
            UpdateOp::Max => "max",
            UpdateOp::Push => "push",
            UpdateOp::Pull => "pull",
            UpdateOp::SetOnInsert => "set_on_insert",
        }
    }
}

/// One mutation of one path.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateLeaf {
    pub path: String,
    pub op: UpdateOp,
    pub value: Bson,
}

/// The untyped update handed to store backends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDoc {
    leaves: Vec<UpdateLeaf>,
}

impl UpdateDoc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves in the order they were first added.
    pub fn leaves(&self) -> &[UpdateLeaf] {
        &self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Adds a leaf.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::ConflictingUpdate`] when the path is already mutated
    /// by another operator or overlaps another mutated path.
    pub fn push(&mut self, leaf: UpdateLeaf) -> Result<(), ExpressionError> {
        for existing in &mut self.leaves {
            if existing.path == leaf.path {
                if existing.op != leaf.op {
                    return Err(ExpressionError::ConflictingUpdate { path: leaf.path });
                }
                existing.value = leaf.value;
                return Ok(());
            }

            if overlaps(&existing.path, &leaf.path) {
                return Err(ExpressionError::ConflictingUpdate { path: leaf.path });
            }
        }

        self.leaves.push(leaf);
        Ok(())
    }

    /// Appends every leaf of `other`.
    pub fn merge(mut self, other: UpdateDoc) -> Result<Self, ExpressionError> {
        for leaf in other.leaves {
            self.push(leaf)?;
        }

        Ok(self)
    }
}

fn overlaps(a: &str, b: &str) -> bool {
    let nested = |outer: &str, inner: &str| {
        inner.len() > outer.len() && inner.starts_with(outer) && inner[outer.len()..].starts_with('.')
    };

    nested(a, b) || nested(b, a)
}

/// An update of documents of the record `R`.
pub struct Update<R> {
    doc: UpdateDoc,
    marker: PhantomData<fn() -> R>,
}

impl<R> Clone for Update<R> {
    fn clone(&self) -> Self {
        Self {
            doc: self.doc.clone(),
            marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Update<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Update").field(&self.doc.leaves).finish()
    }
}

impl<R> PartialEq for Update<R> {
    fn eq(&self, other: &Self) -> bool {
        self.doc == other.doc
    }
}

impl<R: Record> Default for Update<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Update<R> {
    /// An empty update. Submitting it to a store fails with
    /// [`ExpressionError::EmptyUpdate`].
    pub fn new() -> Self {
        Self {
            doc: UpdateDoc::new(),
            marker: PhantomData,
        }
    }

    pub(crate) fn leaf(path: &str, op: UpdateOp, value: Bson) -> Self {
        Self {
            doc: UpdateDoc {
                leaves: vec![UpdateLeaf {
                    path: path.to_string(),
                    op,
                    value,
                }],
            },
            marker: PhantomData,
        }
    }

    pub fn doc(&self) -> &UpdateDoc {
        &self.doc
    }

    pub fn into_doc(self) -> UpdateDoc {
        self.doc
    }

    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }

    /// Combines two updates.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::ConflictingUpdate`] when both touch the same path
    /// with different operators, or overlapping paths.
    pub fn and(self, other: Self) -> Result<Self, ExpressionError> {
        Ok(Self {
            doc: self.doc.merge(other.doc)?,
            marker: PhantomData,
        })
    }

    /// Combines any number of updates, left to right.
    pub fn combine(updates: impl IntoIterator<Item = Self>) -> Result<Self, ExpressionError> {
        updates.into_iter().try_fold(Self::new(), Self::and)
    }

    /// Builds a mutation from a runtime path, checking it against the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::UnknownField`] when the path does not resolve,
    /// [`ExpressionError::InvalidOperator`] when the operator does not apply to the
    /// field (arithmetic on non-numbers, `unset` on a required field, `push`/`pull`
    /// outside sequences), and [`ExpressionError::TypeMismatch`] when the value does
    /// not match.
    pub fn mutate(path: &str, op: UpdateOp, value: impl Into<Bson>) -> Result<Self, ExpressionError> {
        let field_type = resolve::<R>(path)?;
        let value = value.into();

        let invalid = || ExpressionError::InvalidOperator {
            path: path.to_string(),
            op: op.name(),
            field_type: field_type.to_string(),
        };

        let value = match op {
            UpdateOp::Set | UpdateOp::SetOnInsert | UpdateOp::Min | UpdateOp::Max => {
                check_value(path, field_type, value)?
            }
            UpdateOp::Unset if field_type.is_optional() => Bson::Null,
            UpdateOp::Unset => return Err(invalid()),
            UpdateOp::Inc | UpdateOp::Mul if field_type.is_numeric() => {
                check_value(path, field_type, value)?
            }
            UpdateOp::Inc | UpdateOp::Mul => return Err(invalid()),
            UpdateOp::Push => match field_type.element() {
                Some(element) => check_value(path, element, value)?,
                None => return Err(invalid()),
            },
            UpdateOp::Pull => match field_type.element() {
                Some(element) if element.check_operand(&value) => value,
                Some(element) => return Err(type_mismatch(path, element.to_string(), &value)),
                None => return Err(invalid()),
            },
        };

        Ok(Self::leaf(path, op, value))
    }

    /// Flattens a record into the update applied by a merging save.
    ///
    /// Every present field becomes a `set` leaf; nested records are descended into so
    /// that fields absent from `record` stay untouched in the store. Sequences are
    /// replaced whole. A nested record without any present field becomes a
    /// `set_on_insert` of an empty sub-document so a freshly upserted document still
    /// decodes.
    pub fn merge(record: &R) -> Self {
        let mut leaves = Vec::new();
        collect_sets(R::schema(), &record.to_document(), "", &mut leaves);

        Self {
            doc: UpdateDoc { leaves },
            marker: PhantomData,
        }
    }
}

fn check_value(path: &str, field_type: &FieldType, value: Bson) -> Result<Bson, ExpressionError> {
    if field_type.check_value(&value) {
        Ok(value)
    } else {
        Err(type_mismatch(path, field_type.required().to_string(), &value))
    }
}

fn collect_sets(schema: &Schema, document: &Document, prefix: &str, out: &mut Vec<UpdateLeaf>) {
    for (key, value) in document {
        if prefix.is_empty() && key == ID_KEY {
            continue;
        }

        let path = join_path(prefix, key);
        let nested = schema
            .descriptor(key)
            .and_then(|descriptor| match descriptor.field_type().required() {
                FieldType::Embedded(schema) => Some(*schema),
                _ => None,
            });

        match (nested, value) {
            (Some(_), Bson::Document(inner)) if inner.is_empty() => out.push(UpdateLeaf {
                path,
                op: UpdateOp::SetOnInsert,
                value: Bson::Document(Document::new()),
            }),
            (Some(nested), Bson::Document(inner)) => collect_sets(nested, inner, &path, out),
            _ => out.push(UpdateLeaf {
                path,
                op: UpdateOp::Set,
                value: value.clone(),
            }),
        }
    }
}

impl<Root: Record, V: FieldValue> Field<Root, V> {
    fn mutation(&self, op: UpdateOp, value: Option<Bson>) -> Update<Root> {
        match value {
            Some(value) => Update::leaf(self.path(), op, value),
            None => Update::leaf(self.path(), UpdateOp::Unset, Bson::Null),
        }
    }

    /// Replaces the value. Setting `None` on an optional field removes it.
    pub fn set(&self, value: impl Into<V>) -> Update<Root> {
        self.mutation(UpdateOp::Set, value.into().to_bson())
    }

    /// Sets the value only if the update inserts a new document.
    pub fn set_on_insert(&self, value: impl Into<V>) -> Update<Root> {
        self.mutation(UpdateOp::SetOnInsert, value.into().to_bson())
    }
}

impl<Root: Record, V: Scalar> Field<Root, V> {
    /// Keeps the smaller of the stored value and `value`.
    pub fn min(&self, value: impl Into<V::Query>) -> Update<Root> {
        self.mutation(UpdateOp::Min, value.into().to_bson())
    }

    /// Keeps the larger of the stored value and `value`.
    pub fn max(&self, value: impl Into<V::Query>) -> Update<Root> {
        self.mutation(UpdateOp::Max, value.into().to_bson())
    }
}

impl<Root: Record, V: Numeric> Field<Root, V> {
    /// Adds `delta` to the stored number. A missing field is treated as zero.
    pub fn inc(&self, delta: impl Into<V::Query>) -> Update<Root> {
        self.mutation(UpdateOp::Inc, delta.into().to_bson())
    }

    /// Multiplies the stored number by `factor`. A missing field becomes zero.
    pub fn mul(&self, factor: impl Into<V::Query>) -> Update<Root> {
        self.mutation(UpdateOp::Mul, factor.into().to_bson())
    }
}

impl<Root: Record, T: Required> Field<Root, Option<T>> {
    /// Removes the field from the stored document.
    pub fn unset(&self) -> Update<Root> {
        Update::leaf(self.path(), UpdateOp::Unset, Bson::Null)
    }
}

impl<Root: Record, T: Required> Field<Root, Vec<T>> {
    /// Appends `value` to the sequence.
    pub fn push(&self, value: impl Into<T>) -> Update<Root> {
        self.mutation(UpdateOp::Push, value.into().to_bson())
    }

    /// Removes every element equal to `value`.
    pub fn pull(&self, value: impl Into<T::Query>) -> Update<Root> {
        self.mutation(UpdateOp::Pull, value.into().to_bson())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Point, Sample};
    use bson::{doc, oid::ObjectId};

    fn leaves<R>(update: &Update<R>) -> Vec<(&str, UpdateOp)> {
        update
            .doc
            .leaves()
            .iter()
            .map(|leaf| (leaf.path.as_str(), leaf.op))
            .collect()
    }

    #[test]
    fn typed_mutations_pick_operators() {
        let f = Sample::fields();
        let update = Update::combine([
            f.count.inc(2),
            f.score.unset(),
            f.tags.push("new"),
            f.point.x.set(Some(3)),
            f.point.y.set(None),
        ])
        .unwrap();

        assert_eq!(
            leaves(&update),
            vec![
                ("count", UpdateOp::Inc),
                ("score", UpdateOp::Unset),
                ("tags", UpdateOp::Push),
                ("point.x", UpdateOp::Set),
                ("point.y", UpdateOp::Unset),
            ]
        );
    }

    /// `<Supports<T>>::NUMERIC` and `<Supports<T>>::SCALAR` resolve to the inherent
    /// constants only when `T` carries the marker; otherwise the blanket fallback wins.
    struct Supports<T>(PhantomData<T>);

    trait Unsupported {
        const NUMERIC: bool = false;
        const SCALAR: bool = false;
    }

    impl<T> Unsupported for T {}

    impl<T: Numeric> Supports<T> {
        const NUMERIC: bool = true;
    }

    impl<T: Scalar> Supports<T> {
        const SCALAR: bool = true;
    }

    #[test]
    fn arithmetic_and_ordering_exclude_sequences() {
        assert!(<Supports<i32>>::NUMERIC);
        assert!(<Supports<Option<f64>>>::NUMERIC);
        assert!(!<Supports<Vec<i32>>>::NUMERIC);
        assert!(!<Supports<String>>::NUMERIC);

        assert!(<Supports<Option<String>>>::SCALAR);
        assert!(!<Supports<Vec<i64>>>::SCALAR);
        assert!(!<Supports<Point>>::SCALAR);

        let f = Sample::fields();
        assert_eq!(leaves(&f.score.inc(1.5)), vec![("score", UpdateOp::Inc)]);
        assert_eq!(leaves(&f.name.max("z")), vec![("name", UpdateOp::Max)]);

        assert!(matches!(
            Update::<Sample>::mutate("tags", UpdateOp::Inc, 1).unwrap_err(),
            ExpressionError::InvalidOperator { op: "inc", .. }
        ));
    }

    #[test]
    fn repeated_pairs_keep_the_last_value() {
        let f = Sample::fields();
        let update = f.count.set(1).and(f.count.set(2)).unwrap();

        assert_eq!(update.doc().len(), 1);
        assert_eq!(update.doc().leaves()[0].value, Bson::Int32(2));
    }

    #[test]
    fn conflicting_operators_and_overlapping_paths_are_rejected() {
        let f = Sample::fields();

        assert_eq!(
            f.count.set(1).and(f.count.inc(1)).unwrap_err(),
            ExpressionError::ConflictingUpdate { path: "count".into() }
        );
        assert_eq!(
            f.point.field().set(Point::default()).and(f.point.x.set(Some(1))).unwrap_err(),
            ExpressionError::ConflictingUpdate { path: "point.x".into() }
        );
        assert!(f.point.x.set(Some(1)).and(f.point.y.set(Some(1.0))).is_ok());
        assert!(!overlaps("point", "points.x"));
    }

    #[test]
    fn runtime_mutations_are_checked() {
        assert!(Update::<Sample>::mutate("count", UpdateOp::Inc, 1).is_ok());
        assert!(Update::<Sample>::mutate("score", UpdateOp::Mul, 2).is_ok());
        assert!(Update::<Sample>::mutate("tags", UpdateOp::Push, "a").is_ok());
        assert!(Update::<Sample>::mutate("point", UpdateOp::Set, doc! { "x": 1 }).is_ok());

        assert!(matches!(
            Update::<Sample>::mutate("count", UpdateOp::Inc, 1.5).unwrap_err(),
            ExpressionError::TypeMismatch { found: "double", .. }
        ));
        assert!(matches!(
            Update::<Sample>::mutate("label", UpdateOp::Inc, 1).unwrap_err(),
            ExpressionError::InvalidOperator { op: "inc", .. }
        ));
        assert!(matches!(
            Update::<Sample>::mutate("count", UpdateOp::Unset, "").unwrap_err(),
            ExpressionError::InvalidOperator { op: "unset", .. }
        ));
        assert!(matches!(
            Update::<Sample>::mutate("count", UpdateOp::Push, 1).unwrap_err(),
            ExpressionError::InvalidOperator { op: "push", .. }
        ));
        assert!(matches!(
            Update::<Sample>::mutate("point", UpdateOp::Set, doc! { "x": "a" }).unwrap_err(),
            ExpressionError::TypeMismatch { .. }
        ));
        assert!(matches!(
            Update::<Sample>::mutate("missing", UpdateOp::Set, 1).unwrap_err(),
            ExpressionError::UnknownField { .. }
        ));
    }

    #[test]
    fn merge_descends_into_nested_records_only() {
        let sample = Sample {
            id: Some(ObjectId::new()),
            count: 1,
            name: "n".into(),
            score: None,
            tags: vec!["t".into()],
            point: Point { x: None, y: Some(1.5) },
            history: vec![Point { x: Some(1), y: None }],
        };

        assert_eq!(
            leaves(&Update::merge(&sample)),
            vec![
                ("count", UpdateOp::Set),
                ("label", UpdateOp::Set),
                ("tags", UpdateOp::Set),
                ("point.y", UpdateOp::Set),
                ("history", UpdateOp::Set),
            ]
        );

        let empty_point = Sample {
            point: Point::default(),
            ..sample
        };
        let update = Update::merge(&empty_point);
        assert!(leaves(&update).contains(&("point", UpdateOp::SetOnInsert)));
    }
}
