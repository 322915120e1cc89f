//! Filter construction and the query representation handed to store backends.
//!
//! Filters are built from the typed paths of a record and are therefore checked by the
//! compiler:
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let f = User::fields();
//! let adults = f.age.gte(18).and(f.name.starts_with("A"));
//! let recent = Filter::any_of([f.status.eq("new"), f.status.eq("pending")]);
//! ```
//!
//! When paths are only known at runtime, [`Filter::compare`] performs the same checks
//! against the registry and reports failures as [`ExpressionError`]s.
//!
//! # Expression tree
//!
//! Every filter wraps an [`Expr`] tree:
//!
//! - Comparison: `Eq`, `Ne`, `Gt`, `Gte`, `Lt`, `Lte`
//! - String: `StartsWith`, `EndsWith`, `Contains`, `NotContains`
//! - Existence: `Exists`
//! - Membership: `AnyOf`, `NoneOf`
//! - Logical: `And`, `Or`, `Not`
//!
//! Backends translate the tree with a [`QueryVisitor`].

use bson::Bson;
use std::{fmt, marker::PhantomData};

use crate::{
    error::{ExpressionError, StoreError},
    field::{Field, FieldType, ID_KEY, bson_kind},
    record::{Model, Record},
    value::FieldValue,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The dotted path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String contains value.
    Contains,
    /// String does not contain value.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field equals any of the values.
    AnyOf,
    /// Field equals none of the values.
    NoneOf,
}

impl FieldOp {
    /// Operator name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldOp::Eq => "eq",
            FieldOp::Ne => "ne",
            FieldOp::Gt => "gt",
            FieldOp::Gte => "gte",
            FieldOp::Lt => "lt",
            FieldOp::Lte => "lte",
            FieldOp::Contains => "contains",
            FieldOp::NotContains => "not_contains",
            FieldOp::StartsWith => "starts_with",
            FieldOp::EndsWith => "ends_with",
            FieldOp::AnyOf => "any_of",
            FieldOp::NoneOf => "none_of",
        }
    }
}

/// A filter expression tree.
///
/// `And(vec![])` matches every document and `Not(And(vec![]))` matches none.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The dotted path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) if !list.is_empty() => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) if !list.is_empty() => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// A filter over documents of the record `R`.
///
/// `Filter::all()` matches every document.
pub struct Filter<R> {
    expr: Option<Expr>,
    marker: PhantomData<fn() -> R>,
}

impl<R> Clone for Filter<R> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Filter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.expr).finish()
    }
}

impl<R> PartialEq for Filter<R> {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl<R: Record> Filter<R> {
    /// A filter matching every document.
    pub fn all() -> Self {
        Self {
            expr: None,
            marker: PhantomData,
        }
    }

    /// A filter matching no document.
    pub fn none() -> Self {
        Self::from_expr(Expr::Not(Box::new(Expr::And(Vec::new()))))
    }

    pub(crate) fn from_expr(expr: Expr) -> Self {
        Self {
            expr: Some(expr),
            marker: PhantomData,
        }
    }

    /// The expression tree, `None` for a match-all filter.
    pub fn expr(&self) -> Option<&Expr> {
        self.expr.as_ref()
    }

    pub fn into_expr(self) -> Option<Expr> {
        self.expr
    }

    /// Whether the filter matches every document.
    pub fn is_all(&self) -> bool {
        self.expr.is_none()
    }

    /// Both filters must match.
    pub fn and(self, other: Self) -> Self {
        match (self.expr, other.expr) {
            (None, expr) | (expr, None) => Self {
                expr,
                marker: PhantomData,
            },
            (Some(a), Some(b)) => Self::from_expr(a.and(b)),
        }
    }

    /// Either filter must match.
    pub fn or(self, other: Self) -> Self {
        match (self.expr, other.expr) {
            (Some(a), Some(b)) => Self::from_expr(a.or(b)),
            _ => Self::all(),
        }
    }

    /// Inverts the filter.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self.expr {
            Some(expr) => Self::from_expr(expr.not()),
            None => Self::none(),
        }
    }

    /// All filters must match. An empty list matches every document.
    pub fn all_of(filters: impl IntoIterator<Item = Self>) -> Self {
        filters.into_iter().fold(Self::all(), Self::and)
    }

    /// Any filter must match. An empty list matches no document.
    pub fn any_of(filters: impl IntoIterator<Item = Self>) -> Self {
        let mut filters = filters.into_iter();

        match filters.next() {
            Some(first) => filters.fold(first, Self::or),
            None => Self::none(),
        }
    }

    /// Builds a comparison from a runtime path, checking it against the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::UnknownField`] when the path does not resolve,
    /// [`ExpressionError::InvalidOperator`] when the operator does not apply to the
    /// field, and [`ExpressionError::TypeMismatch`] when the value does not match the
    /// field's type.
    pub fn compare(path: &str, op: FieldOp, value: impl Into<Bson>) -> Result<Self, ExpressionError> {
        let field_type = resolve::<R>(path)?;
        let value = value.into();

        check_operand(path, field_type, op, &value)?;

        Ok(Self::from_expr(Expr::field(path.to_string(), op, value)))
    }

    /// Builds an existence test from a runtime path.
    pub fn exists(path: &str, should_exist: bool) -> Result<Self, ExpressionError> {
        resolve::<R>(path)?;

        Ok(Self::from_expr(Expr::Exists(path.to_string(), should_exist)))
    }
}

impl<R: Model> Filter<R> {
    /// Matches the document stored under `id`.
    pub fn by_id(id: &R::Id) -> Self {
        Self::from_expr(Expr::field(
            ID_KEY.to_string(),
            FieldOp::Eq,
            id.to_bson().unwrap_or(Bson::Null),
        ))
    }
}

pub(crate) fn resolve<R: Record>(path: &str) -> Result<&'static FieldType, ExpressionError> {
    let schema = R::schema();

    schema
        .resolve(path)
        .ok_or_else(|| ExpressionError::UnknownField {
            record: schema.name(),
            path: path.to_string(),
        })
}

pub(crate) fn type_mismatch(path: &str, expected: String, value: &Bson) -> ExpressionError {
    ExpressionError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: bson_kind(value),
    }
}

fn check_operand(path: &str, field_type: &FieldType, op: FieldOp, value: &Bson) -> Result<(), ExpressionError> {
    match op {
        FieldOp::Eq | FieldOp::Ne | FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
            if !field_type.check_operand(value) {
                return Err(type_mismatch(path, field_type.required().to_string(), value));
            }
        }
        FieldOp::Contains | FieldOp::NotContains | FieldOp::StartsWith | FieldOp::EndsWith => {
            if !field_type.is_textual() {
                return Err(ExpressionError::InvalidOperator {
                    path: path.to_string(),
                    op: op.name(),
                    field_type: field_type.to_string(),
                });
            }
            if !matches!(value, Bson::String(_)) {
                return Err(type_mismatch(path, FieldType::String.to_string(), value));
            }
        }
        FieldOp::AnyOf | FieldOp::NoneOf => match value {
            Bson::Array(items) => {
                if let Some(item) = items.iter().find(|item| !field_type.check_operand(item)) {
                    return Err(type_mismatch(path, field_type.required().to_string(), item));
                }
            }
            other => {
                return Err(type_mismatch(path, format!("array<{}>", field_type.required()), other));
            }
        },
    }

    Ok(())
}

impl<Root: Record, V: FieldValue> Field<Root, V> {
    fn compare(&self, op: FieldOp, value: V::Query) -> Filter<Root> {
        Filter::from_expr(Expr::field(
            self.path().to_string(),
            op,
            value.to_bson().unwrap_or(Bson::Null),
        ))
    }

    fn membership<I, Q>(&self, op: FieldOp, values: I) -> Filter<Root>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<V::Query>,
    {
        let values = values
            .into_iter()
            .filter_map(|value| value.into().to_bson())
            .collect();

        Filter::from_expr(Expr::field(self.path().to_string(), op, Bson::Array(values)))
    }

    /// Matches documents where the field equals `value`; on a sequence field, where
    /// any element equals it.
    pub fn eq(&self, value: impl Into<V::Query>) -> Filter<Root> {
        self.compare(FieldOp::Eq, value.into())
    }

    pub fn ne(&self, value: impl Into<V::Query>) -> Filter<Root> {
        self.compare(FieldOp::Ne, value.into())
    }

    pub fn gt(&self, value: impl Into<V::Query>) -> Filter<Root> {
        self.compare(FieldOp::Gt, value.into())
    }

    pub fn gte(&self, value: impl Into<V::Query>) -> Filter<Root> {
        self.compare(FieldOp::Gte, value.into())
    }

    pub fn lt(&self, value: impl Into<V::Query>) -> Filter<Root> {
        self.compare(FieldOp::Lt, value.into())
    }

    pub fn lte(&self, value: impl Into<V::Query>) -> Filter<Root> {
        self.compare(FieldOp::Lte, value.into())
    }

    /// Matches documents where the field equals one of `values`.
    pub fn any_of<I, Q>(&self, values: I) -> Filter<Root>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<V::Query>,
    {
        self.membership(FieldOp::AnyOf, values)
    }

    /// Matches documents where the field equals none of `values`.
    pub fn none_of<I, Q>(&self, values: I) -> Filter<Root>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<V::Query>,
    {
        self.membership(FieldOp::NoneOf, values)
    }

    /// Matches documents where the field is present.
    pub fn exists(&self) -> Filter<Root> {
        Filter::from_expr(Expr::Exists(self.path().to_string(), true))
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(&self) -> Filter<Root> {
        Filter::from_expr(Expr::Exists(self.path().to_string(), false))
    }

    /// Ascending sort on this field.
    pub fn asc(&self) -> Sort {
        Sort {
            field: self.path().to_string(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on this field.
    pub fn desc(&self) -> Sort {
        Sort {
            field: self.path().to_string(),
            direction: SortDirection::Desc,
        }
    }
}

impl<Root: Record, V: FieldValue<Query = String>> Field<Root, V> {
    fn text(&self, op: FieldOp, value: impl Into<String>) -> Filter<Root> {
        Filter::from_expr(Expr::field(self.path().to_string(), op, Bson::String(value.into())))
    }

    /// Case-sensitive prefix match.
    pub fn starts_with(&self, value: impl Into<String>) -> Filter<Root> {
        self.text(FieldOp::StartsWith, value)
    }

    /// Case-sensitive suffix match.
    pub fn ends_with(&self, value: impl Into<String>) -> Filter<Root> {
        self.text(FieldOp::EndsWith, value)
    }

    /// Case-sensitive substring match.
    pub fn contains(&self, value: impl Into<String>) -> Filter<Root> {
        self.text(FieldOp::Contains, value)
    }

    pub fn not_contains(&self, value: impl Into<String>) -> Filter<Root> {
        self.text(FieldOp::NotContains, value)
    }
}

/// A structured query handed to a store backend.
///
/// Use [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub offset: Option<usize>,
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder::default()
    }

    /// Sets the filter expression for this query.
    pub fn filter(mut self, filter: Option<Expr>) -> Self {
        self.query.filter = filter;
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.query.limit = limit;
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: Option<usize>) -> Self {
        self.query.offset = offset;
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, sort: Sort) -> Self {
        self.query.sort.push(sort);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// Options for [`TypedCollection::find_with`](crate::collection::TypedCollection::find_with).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub sort: Vec<Sort>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns at most `limit` records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `skip` matching records.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Appends a sort key, e.g. `Person::fields().age.desc()`.
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub(crate) fn into_query(self, filter: Option<Expr>) -> Query {
        self.sort
            .into_iter()
            .fold(Query::builder(), QueryBuilder::sort)
            .filter(filter)
            .limit(self.limit)
            .offset(self.skip)
            .build()
    }
}

/// Translates an expression tree into a backend's native representation.
pub trait QueryVisitor {
    type Output;
    type Error: Into<StoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
