//! The store-access interface consumed by datastores.
//!
//! docbind never talks to a database directly. A backend crate provides:
//!
//! - a [`Connector`] that establishes a [`Connection`] from a
//!   [`ConnectionConfig`](crate::config::ConnectionConfig),
//! - a [`Connection`] that binds entity names and schemas to models,
//! - a [`ModelBackend`] per bound model that executes [`QueryPlan`]s and
//!   performs writes.
//!
//! Callers reach a model through the cloneable [`Model`] handle, which hands
//! out chainable [`StoreQuery`] values:
//!
//! ```ignore
//! let open = model
//!     .find(Some(Filter::eq("status", "open")))
//!     .select(Projection::include(["status", "total"]))
//!     .limit(10)
//!     .sort(vec![Sort::desc("createdAt")])
//!     .execute()
//!     .await?;
//! ```
//!
//! Each chained call only records a clause; nothing reaches the store until
//! `execute` runs, and clauses that were never chained are never sent.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{
    config::ConnectionConfig,
    error::DocumentStoreResult,
    options::{PopulateSpec, Projection},
    query::{Expr, Sort},
    schema::Schema,
};

/// The primitive a query starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKind {
    /// Every document matching the filter (`None` matches all).
    Find { filter: Option<Expr> },
    /// The document with the given identity.
    FindById { id: Bson },
    /// The first document matching the filter.
    FindOne { filter: Option<Expr> },
    /// Atomically replace the first matching document.
    FindOneAndReplace {
        filter: Option<Expr>,
        replacement: Document,
        options: ReplaceOptions,
    },
}

/// Options for [`Model::find_one_and_replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOptions {
    /// Return the document as it is after the replacement rather than before.
    pub return_updated: bool,
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        Self { return_updated: true }
    }
}

/// A fully described query, as handed to a [`ModelBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub kind: QueryKind,
    pub select: Option<Projection>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub sort: Option<Vec<Sort>>,
    pub populate: Vec<PopulateSpec>,
}

impl QueryPlan {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            select: None,
            limit: None,
            skip: None,
            sort: None,
            populate: Vec::new(),
        }
    }

    /// True for primitives that yield at most one document.
    pub fn is_single(&self) -> bool {
        !matches!(self.kind, QueryKind::Find { .. })
    }
}

/// Acknowledgement returned by deletions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteAck {
    pub deleted_count: u64,
}

/// Per-model store operations implemented by a backend.
///
/// Implementations must be thread-safe. Store failures are reported as
/// [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend)
/// and are never swallowed by the layers above.
#[async_trait]
pub trait ModelBackend: Send + Sync + Debug {
    /// The entity name the model was bound under.
    fn name(&self) -> &str;

    /// Runs a query plan. Single-document plans return at most one document.
    async fn execute(&self, plan: QueryPlan) -> DocumentStoreResult<Vec<Document>>;

    /// Inserts a document, returning it with any store-assigned identity.
    async fn create(&self, document: Document) -> DocumentStoreResult<Document>;

    async fn delete_by_id(&self, id: Bson) -> DocumentStoreResult<DeleteAck>;

    /// Deletes every document matching the filter (`None` deletes all).
    async fn delete_all(&self, filter: Option<Expr>) -> DocumentStoreResult<DeleteAck>;

    async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64>;
}

/// A chainable query against one model.
#[derive(Debug, Clone)]
pub struct StoreQuery {
    backend: Arc<dyn ModelBackend>,
    plan: QueryPlan,
}

impl StoreQuery {
    fn new(backend: Arc<dyn ModelBackend>, kind: QueryKind) -> Self {
        Self { backend, plan: QueryPlan::new(kind) }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.plan.select = Some(projection);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.plan.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.plan.skip = Some(skip);
        self
    }

    /// Appends sort keys after any already chained.
    pub fn sort(mut self, sort: Vec<Sort>) -> Self {
        self.plan
            .sort
            .get_or_insert_with(Vec::new)
            .extend(sort);
        self
    }

    pub fn populate(mut self, spec: PopulateSpec) -> Self {
        self.plan.populate.push(spec);
        self
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Runs the query and returns every resulting document.
    pub async fn execute(self) -> DocumentStoreResult<Vec<Document>> {
        self.backend.execute(self.plan).await
    }

    /// Runs the query and returns the first resulting document, if any.
    pub async fn execute_one(self) -> DocumentStoreResult<Option<Document>> {
        Ok(self
            .backend
            .execute(self.plan)
            .await?
            .into_iter()
            .next())
    }
}

/// A cloneable handle to a bound model.
#[derive(Debug, Clone)]
pub struct Model {
    backend: Arc<dyn ModelBackend>,
}

impl Model {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn find(&self, filter: Option<Expr>) -> StoreQuery {
        StoreQuery::new(self.backend.clone(), QueryKind::Find { filter })
    }

    pub fn find_by_id(&self, id: impl Into<Bson>) -> StoreQuery {
        StoreQuery::new(self.backend.clone(), QueryKind::FindById { id: id.into() })
    }

    pub fn find_one(&self, filter: Option<Expr>) -> StoreQuery {
        StoreQuery::new(self.backend.clone(), QueryKind::FindOne { filter })
    }

    pub fn find_one_and_replace(
        &self,
        filter: Option<Expr>,
        replacement: Document,
        options: ReplaceOptions,
    ) -> StoreQuery {
        StoreQuery::new(
            self.backend.clone(),
            QueryKind::FindOneAndReplace { filter, replacement, options },
        )
    }

    pub async fn create(&self, document: Document) -> DocumentStoreResult<Document> {
        self.backend.create(document).await
    }

    pub async fn delete_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<DeleteAck> {
        self.backend.delete_by_id(id.into()).await
    }

    pub async fn delete_all(&self, filter: Option<Expr>) -> DocumentStoreResult<DeleteAck> {
        self.backend.delete_all(filter).await
    }

    pub async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.backend.count(filter).await
    }
}

/// An established connection that can bind models.
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Binds `name` with `schema`, returning the model. Binding the same name
    /// again rebuilds the model.
    async fn bind_model(&self, name: &str, schema: &Schema) -> DocumentStoreResult<Model>;

    /// Binds `name` as a discriminator of the already bound model `base`:
    /// it shares the base's collection and only sees its own documents.
    async fn bind_discriminator(
        &self,
        name: &str,
        schema: &Schema,
        base: &str,
    ) -> DocumentStoreResult<Model>;
}

/// Establishes connections.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn connect(&self, config: &ConnectionConfig) -> DocumentStoreResult<Arc<dyn Connection>>;
}
