//! Query expression evaluation for in-memory document filtering.
//!
//! Paths are resolved the way document databases do: a segment after a sequence fans
//! out over the sequence's sub-documents, a numeric segment selects one position, and a
//! comparison against a sequence matches when the sequence itself or any of its
//! elements matches.

use bson::{Binary, Bson, DateTime, Document, oid::ObjectId};
use std::cmp::Ordering;

use docmodel_core::{
    error::{StoreError, StoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Comparable representation of BSON values.
///
/// Integers of every width compare exactly as `i64`, so `Int32(1)` and `Int64(1)` are
/// equal; they widen to `f64` only against a `Double`. Embedded documents compare as
/// ordered key/value pairs.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (int32 and int64)
    Integer(i64),
    /// Floating point value
    Double(f64),
    /// DateTime value
    DateTime(DateTime),
    /// String value
    String(&'a str),
    /// Object identifier
    ObjectId(ObjectId),
    /// Binary value, uuids included
    Binary(&'a Binary),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Embedded document, in key order
    Map(Vec<(&'a str, Comparable<'a>)>),
    /// Values that never compare equal to anything
    Opaque,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Integer(i64::from(*value)),
            Bson::Int64(value) => Comparable::Integer(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Binary(value) => Comparable::Binary(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<Vec<_>>()
            ),
            _ => Comparable::Opaque,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Integer(a), Comparable::Integer(b)) => a == b,
            (Comparable::Double(a), Comparable::Double(b)) => a == b,
            (Comparable::Integer(a), Comparable::Double(b)) => (*a as f64) == *b,
            (Comparable::Double(a), Comparable::Integer(b)) => *a == (*b as f64),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Binary(a), Comparable::Binary(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Integer(b)) => a.partial_cmp(b),
            (Comparable::Double(a), Comparable::Double(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Double(b)) => (*a as f64).partial_cmp(b),
            (Comparable::Double(a), Comparable::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::Binary(a), Comparable::Binary(b)) => a.bytes.partial_cmp(&b.bytes),
            _ => None,
        }
    }
}

/// Collects the values reachable through a dotted path.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            descend(value, rest, &mut found);
        }
    }

    found
}

fn descend<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*head) {
                descend(next, rest, found);
            }
        }
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(item) = items.get(index) {
                    descend(item, rest, found);
                }
            }
            Err(_) => {
                for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                    descend(item, segments, found);
                }
            }
        },
        _ => {}
    }
}

/// Orders two optional values for sorting: missing values first, then by value.
/// Values of unrelated kinds compare equal.
pub(crate) fn sort_order(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => Comparable::from(left)
            .partial_cmp(&Comparable::from(right))
            .unwrap_or(Ordering::Equal),
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> StoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Evaluates an optional filter; `None` matches everything.
    pub fn matches(document: &'a Document, filter: Option<&Expr>) -> StoreResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }

    /// Every candidate value at `field`, with sequences contributing both themselves
    /// and their elements.
    fn candidates(&self, field: &str) -> Vec<Comparable<'a>> {
        let mut candidates = Vec::new();

        for value in lookup(self.document, field) {
            if let Bson::Array(items) = value {
                candidates.extend(items.iter().map(Comparable::from));
            }
            candidates.push(Comparable::from(value));
        }

        candidates
    }

    fn any_candidate(&self, field: &str, predicate: impl Fn(&Comparable<'a>) -> bool) -> bool {
        self.candidates(field).iter().any(predicate)
    }

    fn any_text(&self, field: &str, value: &Bson, predicate: impl Fn(&str, &str) -> bool) -> bool {
        let Bson::String(needle) = value else {
            return false;
        };

        self.any_candidate(field, |candidate| match candidate {
            Comparable::String(haystack) => predicate(haystack, needle),
            _ => false,
        })
    }

    fn any_member(&self, field: &str, value: &Bson) -> bool {
        let members = match value {
            Bson::Array(values) => values.iter().map(Comparable::from).collect::<Vec<_>>(),
            single => vec![Comparable::from(single)],
        };

        self.any_candidate(field, |candidate| members.iter().any(|member| member == candidate))
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = StoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(!lookup(self.document, field).is_empty() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let target = Comparable::from(value);

        let ordered = |wanted: fn(Ordering) -> bool| {
            self.any_candidate(field, |candidate| {
                candidate
                    .partial_cmp(&target)
                    .is_some_and(wanted)
            })
        };

        Ok(match op {
            FieldOp::Eq => self.any_candidate(field, |candidate| candidate == &target),
            FieldOp::Ne => !self.any_candidate(field, |candidate| candidate == &target),
            FieldOp::Gt => ordered(Ordering::is_gt),
            FieldOp::Gte => ordered(Ordering::is_ge),
            FieldOp::Lt => ordered(Ordering::is_lt),
            FieldOp::Lte => ordered(Ordering::is_le),
            FieldOp::Contains => self.any_text(field, value, |haystack, needle| haystack.contains(needle)),
            FieldOp::NotContains => !self.any_text(field, value, |haystack, needle| haystack.contains(needle)),
            FieldOp::StartsWith => self.any_text(field, value, |haystack, needle| haystack.starts_with(needle)),
            FieldOp::EndsWith => self.any_text(field, value, |haystack, needle| haystack.ends_with(needle)),
            FieldOp::AnyOf => self.any_member(field, value),
            FieldOp::NoneOf => !self.any_member(field, value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn eval(document: &Document, expr: Expr) -> bool {
        DocumentEvaluator::new(document).evaluate(&expr).unwrap()
    }

    fn field(path: &str, op: FieldOp, value: impl Into<Bson>) -> Expr {
        Expr::field(path.to_string(), op, value.into())
    }

    #[test]
    fn numbers_compare_across_widths() {
        let document = doc! { "a": 1_i64, "b": 2.5 };

        assert!(eval(&document, field("a", FieldOp::Eq, 1)));
        assert!(eval(&document, field("a", FieldOp::Lt, 1.5)));
        assert!(eval(&document, field("b", FieldOp::Gte, 2)));
        assert!(!eval(&document, field("a", FieldOp::Eq, "1")));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = 1_i64 << 53;
        let document = doc! { "n": big };

        assert!(eval(&document, field("n", FieldOp::Eq, big)));
        assert!(!eval(&document, field("n", FieldOp::Eq, big + 1)));
        assert!(eval(&document, field("n", FieldOp::Lt, big + 1)));
        assert!(eval(&document, field("n", FieldOp::NoneOf, vec![big + 1, big - 1])));
        assert!(eval(&document, field("n", FieldOp::Eq, big as f64)));
    }

    #[test]
    fn embedded_documents_compare_in_key_order() {
        let document = doc! { "m": { "x": 1, "y": 2 } };

        assert!(eval(&document, field("m", FieldOp::Eq, doc! { "x": 1, "y": 2 })));
        assert!(!eval(&document, field("m", FieldOp::Eq, doc! { "y": 2, "x": 1 })));
    }

    #[test]
    fn nested_and_sequence_paths_fan_out() {
        let document = doc! {
            "m": { "x": 13 },
            "tags": ["red", "blue"],
            "history": [{ "x": 1 }, { "x": 5 }],
        };

        assert!(eval(&document, field("m.x", FieldOp::Eq, 13)));
        assert!(eval(&document, field("tags", FieldOp::Eq, "blue")));
        assert!(eval(&document, field("history.x", FieldOp::Gt, 4)));
        assert!(!eval(&document, field("history.0.x", FieldOp::Gt, 4)));
        assert!(eval(&document, field("tags", FieldOp::StartsWith, "bl")));
        assert!(eval(&document, field("tags", FieldOp::NoneOf, vec!["green"])));
        assert!(!eval(&document, field("tags", FieldOp::AnyOf, vec!["green"])));
    }

    #[test]
    fn missing_fields_only_match_negations() {
        let document = doc! { "a": 1 };

        assert!(!eval(&document, field("b", FieldOp::Eq, 1)));
        assert!(eval(&document, field("b", FieldOp::Ne, 1)));
        assert!(eval(&document, Expr::Exists("b".into(), false)));
        assert!(eval(&document, Expr::And(vec![])));
        assert!(!eval(&document, Expr::Not(Box::new(Expr::And(vec![])))));
        assert!(!eval(&document, Expr::Or(vec![])));
    }

    #[test]
    fn identifiers_are_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let document = doc! { "_id": a };

        assert!(eval(&document, field("_id", FieldOp::Eq, a)));
        assert!(!eval(&document, field("_id", FieldOp::Eq, b)));
    }

    #[test]
    fn missing_values_sort_first() {
        let one = Bson::Int32(1);
        let two = Bson::Double(2.0);

        assert_eq!(sort_order(None, Some(&one)), Ordering::Less);
        assert_eq!(sort_order(Some(&two), Some(&one)), Ordering::Greater);
    }
}
