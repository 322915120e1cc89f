//! Translation from docmodel expressions to MongoDB query and update syntax.

use bson::{Bson, Document, doc};

use docmodel_core::{
    error::{StoreError, StoreResult},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
    update::{UpdateDoc, UpdateOp},
};

/// Translates docmodel query expressions into MongoDB query documents.
///
/// MongoDB has no top-level `$not`, so negation becomes `$nor` over the inner
/// expression, and the empty conjunction becomes the match-everything `{}`.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` matches every document.
    pub fn filter(filter: Option<&Expr>) -> StoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    /// Sort keys in priority order.
    pub fn sort(sort: &[Sort]) -> Option<Document> {
        if sort.is_empty() {
            return None;
        }

        let mut translated = Document::new();
        for key in sort {
            translated.insert(
                key.field.clone(),
                match key.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                },
            );
        }

        Some(translated)
    }

    /// Groups update leaves by operator.
    pub fn update(update: &UpdateDoc) -> Document {
        let mut translated = Document::new();

        for leaf in update.leaves() {
            let operator = match leaf.op {
                UpdateOp::Set => "$set",
                UpdateOp::Unset => "$unset",
                UpdateOp::Inc => "$inc",
                UpdateOp::Mul => "$mul",
                UpdateOp::Min => "$min",
                UpdateOp::Max => "$max",
                UpdateOp::Push => "$push",
                UpdateOp::Pull => "$pull",
                UpdateOp::SetOnInsert => "$setOnInsert",
            };
            let value = match leaf.op {
                UpdateOp::Unset => Bson::String(String::new()),
                _ => leaf.value.clone(),
            };

            match translated.get_mut(operator) {
                Some(Bson::Document(group)) => {
                    group.insert(leaf.path.clone(), value);
                }
                _ => {
                    translated.insert(operator, doc! { leaf.path.clone(): value });
                }
            }
        }

        translated
    }

    fn sub_expressions(&mut self, exprs: &[Expr]) -> StoreResult<Vec<Document>> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect::<StoreResult<Vec<_>>>()
    }
}

/// Escapes regular expression metacharacters so `text` matches literally.
fn escape_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for ch in text.chars() {
        if matches!(ch, '\\' | '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

fn text_operand<'a>(op: &FieldOp, value: &'a Bson) -> StoreResult<&'a str> {
    match value {
        Bson::String(text) => Ok(text),
        _ => Err(StoreError::Backend(format!(
            "{} operator requires a string value",
            op.name(),
        ))),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = StoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": self.sub_expressions(exprs)?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! { "$nor": [{}] });
        }

        Ok(doc! {
            "$or": self.sub_expressions(exprs)?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => doc! {
                    "$regex": escape_pattern(text_operand(op, value)?),
                },
                FieldOp::NotContains => doc! {
                    "$not": { "$regex": escape_pattern(text_operand(op, value)?) },
                },
                FieldOp::StartsWith => doc! {
                    "$regex": format!("^{}", escape_pattern(text_operand(op, value)?)),
                },
                FieldOp::EndsWith => doc! {
                    "$regex": format!("{}$", escape_pattern(text_operand(op, value)?)),
                },
                FieldOp::AnyOf => doc! { "$in": value },
                FieldOp::NoneOf => doc! { "$nin": value },
            }
        })
    }
}
