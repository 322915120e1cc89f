//! Applies update documents to stored documents.

use bson::{Bson, Document};
use std::cmp::Ordering;

use docmodel_core::{
    error::{StoreError, StoreResult},
    field::{ID_KEY, bson_kind},
    query::{Expr, FieldOp},
    update::{UpdateDoc, UpdateLeaf, UpdateOp},
};

use crate::evaluator::Comparable;

/// Applies every leaf of `update` to `document`.
///
/// The document is left untouched when any leaf fails. `set_on_insert` leaves only take
/// effect when `inserting` is set.
pub(crate) fn apply_update(document: &mut Document, update: &UpdateDoc, inserting: bool) -> StoreResult<()> {
    let mut updated = document.clone();

    for leaf in update.leaves() {
        apply_leaf(&mut updated, leaf, inserting)?;
    }

    if !inserting && updated.get(ID_KEY) != document.get(ID_KEY) {
        return Err(StoreError::InvalidUpdate(format!("`{ID_KEY}` cannot be modified")));
    }

    *document = updated;
    Ok(())
}

/// Builds the initial document of an upsert from the equality constraints of `filter`.
pub(crate) fn seed_document(filter: Option<&Expr>) -> StoreResult<Document> {
    let mut document = Document::new();

    if let Some(filter) = filter {
        collect_equalities(filter, &mut document)?;
    }

    Ok(document)
}

fn collect_equalities(expr: &Expr, document: &mut Document) -> StoreResult<()> {
    match expr {
        Expr::And(exprs) => {
            for expr in exprs {
                collect_equalities(expr, document)?;
            }
        }
        Expr::Field { field, op: FieldOp::Eq, value } => set_path(document, field, value.clone())?,
        _ => {}
    }

    Ok(())
}

fn apply_leaf(document: &mut Document, leaf: &UpdateLeaf, inserting: bool) -> StoreResult<()> {
    let path = leaf.path.as_str();
    let current = get_path(document, path);

    let value = match leaf.op {
        UpdateOp::Set => leaf.value.clone(),
        UpdateOp::SetOnInsert if inserting => leaf.value.clone(),
        UpdateOp::SetOnInsert => return Ok(()),
        UpdateOp::Unset => {
            unset_path(document, path);
            return Ok(());
        }
        UpdateOp::Inc => match current {
            Some(current) => arithmetic(current, &leaf.value, leaf.op, path)?,
            None => leaf.value.clone(),
        },
        UpdateOp::Mul => match current {
            Some(current) => arithmetic(current, &leaf.value, leaf.op, path)?,
            None => zero_like(&leaf.value),
        },
        UpdateOp::Min | UpdateOp::Max => {
            let wanted = if leaf.op == UpdateOp::Min { Ordering::Less } else { Ordering::Greater };
            match current {
                Some(current) => {
                    let replace = Comparable::from(&leaf.value)
                        .partial_cmp(&Comparable::from(current))
                        == Some(wanted);
                    if !replace {
                        return Ok(());
                    }
                    leaf.value.clone()
                }
                None => leaf.value.clone(),
            }
        }
        UpdateOp::Push => match current {
            Some(Bson::Array(items)) => {
                let mut items = items.clone();
                items.push(leaf.value.clone());
                Bson::Array(items)
            }
            Some(other) => return Err(not_a_sequence(leaf, other)),
            None => Bson::Array(vec![leaf.value.clone()]),
        },
        UpdateOp::Pull => match current {
            Some(Bson::Array(items)) => {
                let target = Comparable::from(&leaf.value);
                Bson::Array(
                    items
                        .iter()
                        .filter(|item| Comparable::from(*item) != target)
                        .cloned()
                        .collect()
                )
            }
            Some(other) => return Err(not_a_sequence(leaf, other)),
            None => return Ok(()),
        },
    };

    set_path(document, path, value)
}

fn not_a_sequence(leaf: &UpdateLeaf, found: &Bson) -> StoreError {
    StoreError::InvalidUpdate(format!(
        "cannot {} at `{}`: expected an array, found {}",
        leaf.op.name(),
        leaf.path,
        bson_kind(found),
    ))
}

fn arithmetic(current: &Bson, operand: &Bson, op: UpdateOp, path: &str) -> StoreResult<Bson> {
    let integer = |a: i64, b: i64| match op {
        UpdateOp::Mul => a.checked_mul(b),
        _ => a.checked_add(b),
    };
    let float = |a: f64, b: f64| match op {
        UpdateOp::Mul => a * b,
        _ => a + b,
    };
    let overflow = || StoreError::InvalidUpdate(format!("cannot {} at `{path}`: integer overflow", op.name()));

    match (current, operand) {
        (Bson::Int32(a), Bson::Int32(b)) => {
            let result = integer(i64::from(*a), i64::from(*b)).ok_or_else(overflow)?;
            Ok(i32::try_from(result).map_or(Bson::Int64(result), Bson::Int32))
        }
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            match (as_integer(current), as_integer(operand)) {
                (Some(a), Some(b)) => integer(a, b).map(Bson::Int64).ok_or_else(overflow),
                _ => Err(overflow()),
            }
        }
        _ => match (as_float(current), as_float(operand)) {
            (Some(a), Some(b)) => Ok(Bson::Double(float(a, b))),
            _ => Err(StoreError::InvalidUpdate(format!(
                "cannot {} at `{path}`: expected a number, found {}",
                op.name(),
                bson_kind(current),
            ))),
        },
    }
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(value) => Some(i64::from(*value)),
        Bson::Int64(value) => Some(*value),
        _ => None,
    }
}

fn as_float(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(f64::from(*value)),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

fn zero_like(value: &Bson) -> Bson {
    match value {
        Bson::Int32(_) => Bson::Int32(0),
        Bson::Int64(_) => Bson::Int64(0),
        _ => Bson::Double(0.0),
    }
}

/// Value at an exact dotted path; numeric segments index into sequences.
pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    let mut segments = path.split('.');
    let mut current = document.get_mut(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get_mut(segment)?,
            Bson::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Writes `value` at `path`, creating missing intermediate documents.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> StoreResult<()> {
    let segments = path.split('.').collect::<Vec<_>>();
    set_in_document(document, &segments, value, path)
}

fn set_in_document(document: &mut Document, segments: &[&str], value: Bson, path: &str) -> StoreResult<()> {
    let Some((head, rest)) = segments.split_first() else {
        return Err(StoreError::InvalidUpdate("empty update path".to_string()));
    };

    if rest.is_empty() {
        document.insert(*head, value);
        return Ok(());
    }

    if !document.contains_key(*head) {
        document.insert(*head, Document::new());
    }

    match document.get_mut(*head) {
        Some(child) => set_in_value(child, rest, value, path),
        None => Err(StoreError::InvalidUpdate(format!("cannot create `{path}`"))),
    }
}

fn set_in_value(target: &mut Bson, segments: &[&str], value: Bson, path: &str) -> StoreResult<()> {
    match target {
        Bson::Document(doc) => set_in_document(doc, segments, value, path),
        Bson::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return Err(StoreError::InvalidUpdate("empty update path".to_string()));
            };
            let item = head
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index))
                .ok_or_else(|| StoreError::InvalidUpdate(format!("cannot set `{path}`: no element at `{head}`")))?;

            if rest.is_empty() {
                *item = value;
                Ok(())
            } else {
                set_in_value(item, rest, value, path)
            }
        }
        other => Err(StoreError::InvalidUpdate(format!(
            "cannot set `{path}` inside a {} value",
            bson_kind(other),
        ))),
    }
}

fn unset_path(document: &mut Document, path: &str) {
    let Some((parent, key)) = path.rsplit_once('.') else {
        document.remove(path);
        return;
    };

    match get_path_mut(document, parent) {
        Some(Bson::Document(doc)) => {
            doc.remove(key);
        }
        Some(Bson::Array(items)) => {
            if let Some(item) = key.parse::<usize>().ok().and_then(|index| items.get_mut(index)) {
                *item = Bson::Null;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn update(leaves: Vec<(&str, UpdateOp, Bson)>) -> UpdateDoc {
        let mut update = UpdateDoc::new();
        for (path, op, value) in leaves {
            update
                .push(UpdateLeaf { path: path.to_string(), op, value })
                .unwrap();
        }
        update
    }

    #[test]
    fn set_creates_intermediate_documents() {
        let mut document = doc! { "_id": 1 };

        apply_update(&mut document, &update(vec![("m.x", UpdateOp::Set, Bson::Int32(13))]), false).unwrap();

        assert_eq!(document, doc! { "_id": 1, "m": { "x": 13 } });
    }

    #[test]
    fn arithmetic_promotes_numbers() {
        let mut document = doc! { "a": 1, "b": 2_i64, "c": 1.5, "big": i32::MAX };

        apply_update(
            &mut document,
            &update(vec![
                ("a", UpdateOp::Inc, Bson::Int32(2)),
                ("b", UpdateOp::Inc, Bson::Int32(1)),
                ("c", UpdateOp::Mul, Bson::Int32(2)),
                ("big", UpdateOp::Inc, Bson::Int32(1)),
                ("fresh", UpdateOp::Mul, Bson::Int32(7)),
            ]),
            false,
        )
        .unwrap();

        assert_eq!(document.get("a"), Some(&Bson::Int32(3)));
        assert_eq!(document.get("b"), Some(&Bson::Int64(3)));
        assert_eq!(document.get("c"), Some(&Bson::Double(3.0)));
        assert_eq!(document.get("big"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
        assert_eq!(document.get("fresh"), Some(&Bson::Int32(0)));
    }

    #[test]
    fn failed_leaf_leaves_document_untouched() {
        let mut document = doc! { "name": "a", "count": 1 };
        let before = document.clone();

        let err = apply_update(
            &mut document,
            &update(vec![
                ("count", UpdateOp::Inc, Bson::Int32(1)),
                ("name", UpdateOp::Inc, Bson::Int32(1)),
            ]),
            false,
        )
        .unwrap_err();

        assert!(matches!(err, StoreError::InvalidUpdate(_)));
        assert_eq!(document, before);
    }

    #[test]
    fn sequences_push_and_pull() {
        let mut document = doc! { "tags": ["a", "b", "a"] };

        apply_update(&mut document, &update(vec![("tags", UpdateOp::Pull, Bson::from("a"))]), false).unwrap();
        apply_update(&mut document, &update(vec![("tags", UpdateOp::Push, Bson::from("c"))]), false).unwrap();

        assert_eq!(document, doc! { "tags": ["b", "c"] });
    }

    #[test]
    fn min_max_and_unset() {
        let mut document = doc! { "low": 5, "high": 5, "gone": { "x": 1, "y": 2 } };

        apply_update(
            &mut document,
            &update(vec![
                ("low", UpdateOp::Min, Bson::Int32(3)),
                ("high", UpdateOp::Max, Bson::Int32(3)),
                ("gone.x", UpdateOp::Unset, Bson::String(String::new())),
            ]),
            false,
        )
        .unwrap();

        assert_eq!(document, doc! { "low": 3, "high": 5, "gone": { "y": 2 } });
    }

    #[test]
    fn set_on_insert_only_applies_when_inserting() {
        let leaves = update(vec![("created", UpdateOp::SetOnInsert, Bson::Boolean(true))]);
        let mut existing = doc! {};
        let mut inserted = doc! {};

        apply_update(&mut existing, &leaves, false).unwrap();
        apply_update(&mut inserted, &leaves, true).unwrap();

        assert!(existing.is_empty());
        assert_eq!(inserted, doc! { "created": true });
    }

    #[test]
    fn identifier_is_immutable() {
        let mut document = doc! { "_id": 1 };

        let err = apply_update(&mut document, &update(vec![("_id", UpdateOp::Set, Bson::Int32(2))]), false).unwrap_err();

        assert!(matches!(err, StoreError::InvalidUpdate(_)));
    }

    #[test]
    fn upserts_seed_from_equalities() {
        let filter = Expr::And(vec![
            Expr::field("_id".into(), FieldOp::Eq, Bson::Int32(7)),
            Expr::field("m.x".into(), FieldOp::Eq, Bson::Int32(1)),
            Expr::field("y".into(), FieldOp::Gt, Bson::Int32(1)),
        ]);

        assert_eq!(seed_document(Some(&filter)).unwrap(), doc! { "_id": 7, "m": { "x": 1 } });
    }
}
