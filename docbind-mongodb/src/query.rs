//! Translation of docbind filter expressions into MongoDB query documents.

use bson::{Bson, Document, doc};

use docbind_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Translates filter expressions into MongoDB's BSON query syntax.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` and match-all become `{}`.
    pub fn filter(expr: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match expr {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // MongoDB rejects an empty `$and`.
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
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
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": regex_escape(s), "$options": "i" },
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$elemMatch": { "$eq": other } },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": regex_escape(s), "$options": "i" } },
                    Bson::Array(arr) => doc! { "$nin": arr },
                    other => doc! { "$ne": other },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", regex_escape(s)), "$options": "i" },
                    _ => return Err(DocumentStoreError::InvalidQuery("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", regex_escape(s)), "$options": "i" },
                    _ => return Err(DocumentStoreError::InvalidQuery("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => doc! { "$in": as_array(value) },
                FieldOp::NoneOf => doc! { "$nin": as_array(value) },
            }
        })
    }
}

fn as_array(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        single => Bson::Array(vec![single.clone()]),
    }
}

fn regex_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbind_core::query::Filter;

    #[test]
    fn match_all_is_an_empty_filter() {
        assert_eq!(MongoQueryTranslator::filter(Some(&Expr::match_all())).unwrap(), doc! {});
        assert_eq!(MongoQueryTranslator::filter(None).unwrap(), doc! {});
    }

    #[test]
    fn field_operators() {
        let filter = MongoQueryTranslator::filter(Some(&Filter::and([
            Filter::eq("status", "open"),
            Filter::gte("total", 10),
            Filter::any_of("tags", "rush"),
        ])))
        .unwrap();

        assert_eq!(
            filter,
            doc! {
                "$and": [
                    { "status": { "$eq": "open" } },
                    { "total": { "$gte": 10 } },
                    { "tags": { "$in": ["rush"] } },
                ]
            }
        );
    }

    #[test]
    fn negation_uses_nor() {
        let filter = MongoQueryTranslator::filter(Some(&Filter::eq("status", "open").not())).unwrap();

        assert_eq!(filter, doc! { "$nor": [{ "status": { "$eq": "open" } }] });
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let filter = MongoQueryTranslator::filter(Some(&Filter::starts_with("sku", "a.b"))).unwrap();

        assert_eq!(filter, doc! { "sku": { "$regex": "^a\\.b", "$options": "i" } });
    }
}
