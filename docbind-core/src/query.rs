//! Filter conditions and sort specifications.
//!
//! A condition is an [`Expr`] tree. It can be built with the [`Filter`] helpers
//! or parsed from a plain filter document:
//!
//! ```ignore
//! use docbind::query::{Expr, Filter};
//! use bson::doc;
//!
//! let built = Filter::eq("status", "open").and(Filter::gt("total", 10));
//! let parsed = Expr::from_document(&doc! { "status": "open", "total": { "$gt": 10 } })?;
//! ```
//!
//! Backends consume expressions through the [`QueryVisitor`] trait.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    #[serde(alias = "ascending")]
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    #[serde(alias = "descending")]
    Desc,
}

impl SortDirection {
    /// The numeric form used in store sort documents.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// One sort key: which field to sort by and in which direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }

    /// Renders an ordered list of sort keys as a store sort document.
    pub fn to_document(sort: &[Sort]) -> Document {
        sort.iter()
            .map(|s| (s.field.clone(), Bson::Int32(s.direction.as_i32())))
            .collect()
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
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
    /// String or array contains value.
    Contains,
    /// String or array does not contain value.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field matches any of the values.
    AnyOf,
    /// Field matches none of the values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// An empty `And` matches every document, which is how "no condition" is
/// expressed when a filter is required.
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
        /// The field name (dotted paths address nested documents).
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

    /// An expression matching every document.
    pub fn match_all() -> Self {
        Expr::And(Vec::new())
    }

    /// Returns true when this expression matches every document.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Expr::And(list) if list.is_empty())
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
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

    /// Parses a plain filter document into an expression.
    ///
    /// `{field: value}` is an equality test. A value that is a document made
    /// only of operator keys (`$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
    /// `$nin`, `$exists`) becomes the matching comparisons. `$and`, `$or` and
    /// `$not` nest. Several top-level keys are AND-ed; an empty document
    /// matches everything.
    pub fn from_document(document: &Document) -> DocumentStoreResult<Self> {
        let mut exprs = document
            .iter()
            .map(|(key, value)| match key.as_str() {
                "$and" => Ok(Expr::And(Self::from_array(key, value)?)),
                "$or" => Ok(Expr::Or(Self::from_array(key, value)?)),
                "$not" => match value {
                    Bson::Document(inner) => Ok(Self::from_document(inner)?.not()),
                    _ => Err(DocumentStoreError::InvalidQuery("$not requires a document".into())),
                },
                op if op.starts_with('$') => Err(DocumentStoreError::InvalidQuery(
                    format!("unsupported top-level operator {op}"),
                )),
                field => Self::from_field(field, value),
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }

    fn from_array(op: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
        match value {
            Bson::Array(items) => items
                .iter()
                .map(|item| match item {
                    Bson::Document(inner) => Self::from_document(inner),
                    _ => Err(DocumentStoreError::InvalidQuery(format!("{op} entries must be documents"))),
                })
                .collect(),
            _ => Err(DocumentStoreError::InvalidQuery(format!("{op} requires an array"))),
        }
    }

    fn from_field(field: &str, value: &Bson) -> DocumentStoreResult<Expr> {
        let operators = match value {
            Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops,
            _ => return Ok(Filter::eq(field, value.clone())),
        };

        let mut exprs = operators
            .iter()
            .map(|(op, operand)| {
                let op = match op.as_str() {
                    "$eq" => FieldOp::Eq,
                    "$ne" => FieldOp::Ne,
                    "$gt" => FieldOp::Gt,
                    "$gte" => FieldOp::Gte,
                    "$lt" => FieldOp::Lt,
                    "$lte" => FieldOp::Lte,
                    "$in" => FieldOp::AnyOf,
                    "$nin" => FieldOp::NoneOf,
                    "$exists" => {
                        return match operand {
                            Bson::Boolean(flag) => Ok(Expr::Exists(field.to_string(), *flag)),
                            _ => Err(DocumentStoreError::InvalidQuery("$exists requires a boolean".into())),
                        };
                    }
                    other => {
                        return Err(DocumentStoreError::InvalidQuery(format!(
                            "unsupported operator {other} on field {field}"
                        )));
                    }
                };

                Ok(Expr::field(field.to_string(), op, operand.clone()))
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }
}

impl TryFrom<Document> for Expr {
    type Error = DocumentStoreError;

    fn try_from(document: Document) -> DocumentStoreResult<Self> {
        Expr::from_document(&document)
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is missing.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the values (or, for an
    /// array field, shares an element with them).
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

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
