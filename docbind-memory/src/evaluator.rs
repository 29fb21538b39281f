//! Filter evaluation, ordering and projection over in-memory documents.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docbind_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    options::{Inclusion, Projection},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Comparable view of a BSON value. Numbers of every width compare as `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the type in the cross-type sort order (nulls first).
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting; values of different types order by type.
    /// NaN sorts before every other number.
    fn sort_cmp(&self, other: &Self) -> Ordering {
        if let (Comparable::Number(a), Comparable::Number(b)) = (self, other) {
            return match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            };
        }

        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Resolves a dotted path (`"customer.address.city"`) inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Orders documents by the sort keys, first key first.
pub(crate) fn compare(left: &Document, right: &Document, sort: &[Sort]) -> Ordering {
    let null = Comparable::Null;

    for key in sort {
        let a = lookup(left, &key.field).map(Comparable::from);
        let b = lookup(right, &key.field).map(Comparable::from);
        let ordering = a.as_ref().unwrap_or(&null).sort_cmp(b.as_ref().unwrap_or(&null));

        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies a projection to a top-level document.
///
/// An inclusive projection keeps `_id` unless `_id` is explicitly excluded.
pub(crate) fn project(document: &Document, projection: &Projection) -> Document {
    if projection.is_empty() {
        return document.clone();
    }

    let excluded = |name: &str| {
        projection
            .fields()
            .iter()
            .any(|(field, inclusion)| field == name && *inclusion == Inclusion::Exclude)
    };

    if projection.is_inclusive() {
        document
            .iter()
            .filter(|(key, _)| {
                (key.as_str() == "_id" && !excluded("_id"))
                    || projection
                        .fields()
                        .iter()
                        .any(|(field, inclusion)| {
                            *inclusion == Inclusion::Include
                                && (field == *key || field.split('.').next() == Some(key.as_str()))
                        })
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    } else {
        document
            .iter()
            .filter(|(key, _)| !excluded(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// True when `document` matches `filter`; `None` matches everything.
    pub fn matches(document: &Document, filter: Option<&Expr>) -> DocumentStoreResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }
}

fn any_shared(field_value: &Comparable<'_>, values: &Comparable<'_>) -> bool {
    match (field_value, values) {
        (Comparable::Array(array), Comparable::Array(values)) => values
            .iter()
            .any(|val| array.iter().any(|item| item == val)),
        (Comparable::Array(array), single) => array.iter().any(|item| item == single),
        (single, Comparable::Array(values)) => values.iter().any(|val| val == single),
        (single, other) => single == other,
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

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
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let expected = Comparable::from(value);

        // A missing field only satisfies the negative operators (and `== null`).
        let Some(field_value) = lookup(self.document, field) else {
            return Ok(match op {
                FieldOp::Eq => expected == Comparable::Null,
                FieldOp::Ne => expected != Comparable::Null,
                FieldOp::NotContains | FieldOp::NoneOf => true,
                _ => false,
            });
        };
        let actual = Comparable::from(field_value);

        Ok(match op {
            // Equality against an array field matches any element, as stores do.
            FieldOp::Eq => actual == expected || matches!(&actual, Comparable::Array(items) if items.contains(&expected)),
            FieldOp::Ne => !(actual == expected || matches!(&actual, Comparable::Array(items) if items.contains(&expected))),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match actual.partial_cmp(&expected) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            FieldOp::Contains => match (&actual, &expected) {
                (Comparable::Array(items), _) => items.contains(&expected),
                (Comparable::String(left), Comparable::String(right)) => left.contains(right),
                _ => false,
            },
            FieldOp::NotContains => match (&actual, &expected) {
                (Comparable::Array(items), _) => !items.contains(&expected),
                (Comparable::String(left), Comparable::String(right)) => !left.contains(right),
                _ => true,
            },
            FieldOp::StartsWith => match (&actual, &expected) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (&actual, &expected) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => any_shared(&actual, &expected),
            FieldOp::NoneOf => !any_shared(&actual, &expected),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docbind_core::query::Filter;

    fn eval(document: &Document, expr: Expr) -> bool {
        DocumentEvaluator::new(document).evaluate(&expr).unwrap()
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        let order = doc! { "customer": { "address": { "city": "Oslo" } } };

        assert!(eval(&order, Filter::eq("customer.address.city", "Oslo")));
        assert!(eval(&order, Filter::not_exists("customer.address.zip")));
    }

    #[test]
    fn missing_fields_satisfy_only_negative_operators() {
        let order = doc! { "status": "open" };

        assert!(!eval(&order, Filter::gt("total", 1)));
        assert!(eval(&order, Filter::ne("total", 1)));
        assert!(eval(&order, Filter::none_of("tags", vec!["rush"])));
    }

    #[test]
    fn membership_operators() {
        let order = doc! { "status": "open", "tags": ["rush", "gift"] };

        assert!(eval(&order, Filter::any_of("status", vec!["open", "paid"])));
        assert!(eval(&order, Filter::eq("tags", "gift")));
        assert!(eval(&order, Filter::none_of("tags", vec!["fragile"])));
    }

    #[test]
    fn sort_uses_keys_in_order() {
        let mut docs = vec![
            doc! { "status": "open", "n": 1 },
            doc! { "status": "closed", "n": 2 },
            doc! { "status": "open", "n": 3 },
        ];

        docs.sort_by(|a, b| compare(a, b, &[Sort::asc("status"), Sort::desc("n")]));

        let order: Vec<i32> = docs.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn nan_sorts_before_other_numbers() {
        let mut docs: Vec<Document> = (0..50)
            .map(|i| match i % 7 {
                0 => doc! { "n": f64::NAN },
                _ => doc! { "n": ((i * 37) % 50) as f64 },
            })
            .collect();

        docs.sort_by(|a, b| compare(a, b, &[Sort::asc("n")]));

        let values: Vec<f64> = docs.iter().map(|d| d.get_f64("n").unwrap()).collect();
        let nans = values.iter().take_while(|n| n.is_nan()).count();

        assert_eq!(nans, 8);
        assert!(values[nans..].iter().all(|n| !n.is_nan()));
        assert!(values[nans..].windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn inclusive_projection_keeps_id() {
        let order = doc! { "_id": 1, "status": "open", "total": 10 };

        assert_eq!(project(&order, &Projection::include(["status"])), doc! { "_id": 1, "status": "open" });
        assert_eq!(
            project(&order, &Projection::include(["status"]).field("_id", Inclusion::Exclude)),
            doc! { "status": "open" }
        );
        assert_eq!(project(&order, &Projection::exclude(["total"])), doc! { "_id": 1, "status": "open" });
    }
}
