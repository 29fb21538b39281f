//! Named, schema-carrying handles to a collection.
//!
//! A [`Datastore`] starts unbound. Once a connection binds it (usually the
//! [`ConnectionRegistry`](crate::registry::ConnectionRegistry) does this when
//! the owning scope becomes ready) every query operation runs against the
//! bound model. Operations on an unbound datastore fail with
//! [`DocumentStoreError::Unbound`].
//!
//! # Example
//!
//! ```ignore
//! use docbind::prelude::*;
//!
//! let orders = registry.get_datastore("Orders").await?;
//! let open = orders
//!     .fetch_many(
//!         QueryOptions::builder()
//!             .condition(Filter::eq("status", "open"))
//!             .limit(10)
//!             .sort("createdAt", SortDirection::Desc),
//!     )
//!     .await?;
//! ```

use bson::{Bson, Document};
use mea::rwlock::RwLock;
use std::{fmt, marker::PhantomData, sync::Arc};

use crate::{
    backend::{Connection, DeleteAck, Model, ReplaceOptions},
    compose::{compose_by_id, compose_many},
    entity::{Entity, EntityExt},
    error::{DocumentStoreError, DocumentStoreResult},
    middleware::{DatastoreMiddleware, MiddlewareChain},
    options::{ByIdOptions, PaginationSort, PopulateSpec, QueryOptions},
    page::{Page, PaginationParams},
    query::{Expr, Sort},
    schema::Schema,
};

pub struct Datastore {
    name: String,
    schema: Schema,
    base: Option<String>,
    middleware: MiddlewareChain,
    model: RwLock<Option<Model>>,
}

impl Datastore {
    /// Creates an unbound datastore with no middleware.
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self::builder(name).schema(schema).build()
    }

    pub fn builder(name: impl Into<String>) -> DatastoreBuilder {
        DatastoreBuilder::new(name)
    }

    /// Creates an unbound datastore named, shaped and based after `E`.
    pub fn for_entity<E: Entity>() -> Self {
        Self::entity_builder::<E>().build()
    }

    /// Like [`Datastore::for_entity`], but leaves room for middleware.
    pub fn entity_builder<E: Entity>() -> DatastoreBuilder {
        let builder = Self::builder(E::entity_name()).schema(E::schema());

        match E::base_entity() {
            Some(base) => builder.base(base),
            None => builder,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The base model when this datastore is a discriminator.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    pub async fn is_bound(&self) -> bool {
        self.model.read().await.is_some()
    }

    /// Binds this datastore on `connection`.
    ///
    /// Discriminators are bound through their base model, which must already
    /// be bound on the same connection. Binding again replaces the model.
    ///
    /// # Errors
    ///
    /// Returns the connection's error when the model cannot be bound; the
    /// previous binding, if any, is kept.
    pub async fn init(&self, connection: &dyn Connection) -> DocumentStoreResult<()> {
        let model = match &self.base {
            Some(base) => {
                connection
                    .bind_discriminator(&self.name, &self.schema, base)
                    .await?
            }
            None => connection.bind_model(&self.name, &self.schema).await?,
        };

        let mut slot = self.model.write().await;
        if slot.is_some() {
            tracing::debug!(datastore = %self.name, "rebinding model");
        }
        *slot = Some(model);

        Ok(())
    }

    /// The bound model.
    pub async fn model(&self) -> DocumentStoreResult<Model> {
        self.model
            .read()
            .await
            .clone()
            .ok_or_else(|| DocumentStoreError::Unbound(self.name.clone()))
    }

    /// Fetches every document selected by `options`.
    ///
    /// Only the aspects present in `options` reach the store: no condition
    /// matches all documents, no pagination returns an unbounded list.
    pub async fn fetch_many(
        &self,
        options: impl Into<QueryOptions>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let model = self.model().await?;
        compose_many(&model, &options.into()).execute().await
    }

    /// Fetches the document with identity `id`.
    ///
    /// Limit and skip are never applied to an identity lookup, even when the
    /// options were converted from [`QueryOptions`] carrying them.
    pub async fn fetch_by_id(
        &self,
        id: impl Into<Bson>,
        options: impl Into<ByIdOptions>,
    ) -> DocumentStoreResult<Option<Document>> {
        let model = self.model().await?;
        compose_by_id(&model, id.into(), &options.into())
            .execute_one()
            .await
    }

    /// Fetches the first document matching the raw filter, with middleware.
    ///
    /// Pre-check middleware derive options from `raw` before the fetch;
    /// post-check middleware then vote on the fetched document. A single
    /// negative vote turns the result into `None`.
    pub async fn fetch_one(&self, raw: Document) -> DocumentStoreResult<Option<Document>> {
        let model = self.model().await?;
        let derived = self.middleware.run_pre_check(&raw);
        let filter = Expr::from_document(&raw)?;

        let Some(document) = model.find_one(Some(filter)).execute_one().await? else {
            return Ok(None);
        };

        if self.middleware.run_post_check(&document, &derived) {
            Ok(Some(document))
        } else {
            tracing::debug!(datastore = %self.name, "post-check rejected document");
            Ok(None)
        }
    }

    /// Same as [`Datastore::fetch_one`].
    pub async fn fetch_one_by_options(
        &self,
        raw: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        self.fetch_one(raw).await
    }

    /// Fetches with a filter and optional pagination, bypassing aspect
    /// classification.
    pub async fn fetch_many_raw(
        &self,
        filter: Option<Expr>,
        pagination: Option<PaginationSort>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let model = self.model().await?;
        let query = model.find(filter);

        let query = match pagination {
            Some(pagination) => {
                let query = match pagination.effective_limit() {
                    Some(limit) => query.limit(limit),
                    None => query,
                };
                let query = match pagination.effective_skip() {
                    Some(skip) => query.skip(skip),
                    None => query,
                };
                match pagination.sort.is_empty() {
                    true => query,
                    false => query.sort(pagination.sort),
                }
            }
            None => query,
        };

        query.execute().await
    }

    /// Fetches a window of all documents. A zero limit means no limit.
    pub async fn fetch_paginated(
        &self,
        skip: u64,
        limit: u64,
        sort: Vec<Sort>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let options = QueryOptions::builder()
            .pagination(PaginationSort { limit: Some(limit), skip: Some(skip), sort })
            .build();

        self.fetch_many(options).await
    }

    /// Fetches with a condition and options, populating each of `paths`.
    pub async fn fetch_populated<I, P>(
        &self,
        condition: Expr,
        pagination: PaginationSort,
        paths: I,
    ) -> DocumentStoreResult<Vec<Document>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PopulateSpec>,
    {
        let options = paths
            .into_iter()
            .fold(
                QueryOptions::builder()
                    .condition(condition)
                    .pagination(pagination),
                |builder, path| builder.populate(path),
            )
            .build();

        self.fetch_many(options).await
    }

    /// Counts the documents matching `filter`; `None` counts all.
    pub async fn count_matching(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.model().await?.count(filter).await
    }

    /// Inserts a document after running the create middleware over it.
    pub async fn create(&self, mut document: Document) -> DocumentStoreResult<Document> {
        let model = self.model().await?;
        self.middleware.run_create(&mut document)?;

        model.create(document).await
    }

    /// Replaces the first document matching `filter` with `replacement`,
    /// returning the stored document as it is afterwards.
    ///
    /// The create middleware runs over the replacement first. `None` is
    /// returned when nothing matched.
    pub async fn find_one_and_update(
        &self,
        filter: Expr,
        mut replacement: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        let model = self.model().await?;
        self.middleware.run_create(&mut replacement)?;

        model
            .find_one_and_replace(Some(filter), replacement, ReplaceOptions::default())
            .execute_one()
            .await
    }

    pub async fn remove_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<DeleteAck> {
        self.model().await?.delete_by_id(id).await
    }

    /// Deletes every document in the collection.
    pub async fn remove_all(&self) -> DocumentStoreResult<DeleteAck> {
        let model = self.model().await?;
        let ack = model.delete_all(None).await?;

        tracing::warn!(
            datastore = %self.name,
            deleted = ack.deleted_count,
            "removed every document"
        );

        Ok(ack)
    }

    /// Fetches one numbered page of all documents.
    pub async fn fetch_page(
        &self,
        params: &PaginationParams,
        sort: Vec<Sort>,
    ) -> DocumentStoreResult<Page<Document>> {
        // Page 0 reads as page 1.
        let page = params.page.max(1);
        let count = self.count_matching(None).await? as usize;
        let items = self
            .fetch_paginated(params.offset() as u64, params.per_page as u64, sort)
            .await?;
        let end = params.offset() + items.len();

        Ok(Page::builder(items)
            .with_count(count)
            .with_next_page((end < count).then(|| page + 1))
            .with_previous_page((page > 1).then(|| page - 1))
            .build())
    }

    /// A typed view over this datastore.
    pub fn typed<E: Entity>(&self) -> TypedDatastore<'_, E> {
        TypedDatastore { inner: self, _marker: PhantomData }
    }
}

impl fmt::Debug for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

pub struct DatastoreBuilder {
    name: String,
    schema: Schema,
    base: Option<String>,
    middleware: MiddlewareChain,
}

impl DatastoreBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::default(),
            base: None,
            middleware: MiddlewareChain::new(),
        }
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Makes the datastore a discriminator of `base`.
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Appends a middleware. Hooks run in the order middleware were added.
    pub fn middleware(mut self, middleware: impl DatastoreMiddleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Datastore {
        Datastore {
            name: self.name,
            schema: self.schema,
            base: self.base,
            middleware: self.middleware,
            model: RwLock::new(None),
        }
    }
}

/// A view of a [`Datastore`] that converts documents to and from `E`.
pub struct TypedDatastore<'a, E: Entity> {
    inner: &'a Datastore,
    _marker: PhantomData<E>,
}

impl<'a, E: Entity> TypedDatastore<'a, E> {
    pub fn untyped(&self) -> &'a Datastore {
        self.inner
    }

    pub async fn fetch_many(&self, options: impl Into<QueryOptions>) -> DocumentStoreResult<Vec<E>> {
        self.inner
            .fetch_many(options)
            .await?
            .into_iter()
            .map(E::from_document)
            .collect()
    }

    pub async fn fetch_by_id(
        &self,
        id: impl Into<Bson>,
        options: impl Into<ByIdOptions>,
    ) -> DocumentStoreResult<Option<E>> {
        self.inner
            .fetch_by_id(id, options)
            .await?
            .map(E::from_document)
            .transpose()
    }

    pub async fn fetch_one(&self, raw: Document) -> DocumentStoreResult<Option<E>> {
        self.inner
            .fetch_one(raw)
            .await?
            .map(E::from_document)
            .transpose()
    }

    pub async fn create(&self, entity: &E) -> DocumentStoreResult<E> {
        E::from_document(self.inner.create(entity.to_document()?).await?)
    }

    pub async fn find_one_and_update(&self, filter: Expr, entity: &E) -> DocumentStoreResult<Option<E>> {
        self.inner
            .find_one_and_update(filter, entity.to_document()?)
            .await?
            .map(E::from_document)
            .transpose()
    }

    pub async fn count_matching(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.inner.count_matching(filter).await
    }

    pub async fn remove_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<DeleteAck> {
        self.inner.remove_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{ModelBackend, QueryKind, QueryPlan},
        query::{Filter, SortDirection},
    };
    use async_trait::async_trait;
    use bson::doc;
    use std::sync::Mutex;

    /// Records every plan and returns a canned result.
    #[derive(Debug, Default)]
    struct Recording {
        plans: Mutex<Vec<QueryPlan>>,
        rows: Vec<Document>,
        deletes: Mutex<Vec<Option<Expr>>>,
    }

    #[async_trait]
    impl ModelBackend for Recording {
        fn name(&self) -> &str {
            "Orders"
        }

        async fn execute(&self, plan: QueryPlan) -> DocumentStoreResult<Vec<Document>> {
            let single = plan.is_single();
            let rows = match &plan.kind {
                QueryKind::FindOneAndReplace { replacement, .. } => vec![replacement.clone()],
                _ => self.rows.clone(),
            };
            self.plans.lock().unwrap().push(plan);

            Ok(if single { rows.into_iter().take(1).collect() } else { rows })
        }

        async fn create(&self, document: Document) -> DocumentStoreResult<Document> {
            Ok(document)
        }

        async fn delete_by_id(&self, _id: Bson) -> DocumentStoreResult<DeleteAck> {
            Ok(DeleteAck { deleted_count: 1 })
        }

        async fn delete_all(&self, filter: Option<Expr>) -> DocumentStoreResult<DeleteAck> {
            self.deletes.lock().unwrap().push(filter);
            Ok(DeleteAck { deleted_count: self.rows.len() as u64 })
        }

        async fn count(&self, _filter: Option<Expr>) -> DocumentStoreResult<u64> {
            Ok(self.rows.len() as u64)
        }
    }

    #[derive(Debug)]
    struct Fixed(Arc<Recording>);

    #[async_trait]
    impl Connection for Fixed {
        async fn bind_model(&self, _name: &str, _schema: &Schema) -> DocumentStoreResult<Model> {
            Ok(Model::new(self.0.clone()))
        }

        async fn bind_discriminator(
            &self,
            _name: &str,
            _schema: &Schema,
            _base: &str,
        ) -> DocumentStoreResult<Model> {
            Ok(Model::new(self.0.clone()))
        }
    }

    async fn bound(rows: Vec<Document>, builder: DatastoreBuilder) -> (Datastore, Arc<Recording>) {
        let recording = Arc::new(Recording { rows, ..Default::default() });
        let datastore = builder.build();
        datastore.init(&Fixed(recording.clone())).await.unwrap();

        (datastore, recording)
    }

    fn last_plan(recording: &Recording) -> QueryPlan {
        recording.plans.lock().unwrap().last().cloned().unwrap()
    }

    struct Veto;

    impl DatastoreMiddleware for Veto {
        fn on_post_check(&self, _document: &Document, _derived: &Document) -> bool {
            false
        }
    }

    struct Stamp;

    impl DatastoreMiddleware for Stamp {
        fn on_create(&self, document: &mut Document) -> DocumentStoreResult<()> {
            document.insert("stamped", true);
            Ok(())
        }
    }

    #[tokio::test]
    async fn unbound_operations_fail() {
        let datastore = Datastore::new("Orders", Schema::default());

        assert!(!datastore.is_bound().await);
        assert!(matches!(
            datastore.fetch_many(QueryOptions::new()).await,
            Err(DocumentStoreError::Unbound(name)) if name == "Orders"
        ));
    }

    #[tokio::test]
    async fn fetch_many_without_options_matches_all() {
        let (datastore, recording) = bound(vec![doc! { "_id": 1 }], Datastore::builder("Orders")).await;

        let rows = datastore.fetch_many(QueryOptions::new()).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(last_plan(&recording), QueryPlan::new(QueryKind::Find { filter: None }));
    }

    #[tokio::test]
    async fn post_check_veto_hides_the_document() {
        let (datastore, _) = bound(
            vec![doc! { "_id": 1, "status": "open" }],
            Datastore::builder("Orders").middleware(Veto),
        )
        .await;

        assert_eq!(datastore.fetch_one(doc! { "status": "open" }).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_one_without_middleware_returns_the_match() {
        let (datastore, recording) = bound(vec![doc! { "_id": 1 }], Datastore::builder("Orders")).await;

        let found = datastore.fetch_one(doc! { "status": "open" }).await.unwrap();

        assert_eq!(found, Some(doc! { "_id": 1 }));
        assert_eq!(
            last_plan(&recording).kind,
            QueryKind::FindOne { filter: Some(Filter::eq("status", "open")) }
        );
    }

    #[tokio::test]
    async fn writes_run_create_middleware() {
        let (datastore, recording) = bound(vec![], Datastore::builder("Orders").middleware(Stamp)).await;

        let created = datastore.create(doc! { "status": "new" }).await.unwrap();
        assert_eq!(created, doc! { "status": "new", "stamped": true });

        let updated = datastore
            .find_one_and_update(Filter::eq("_id", 1), doc! { "status": "paid" })
            .await
            .unwrap();
        assert_eq!(updated, Some(doc! { "status": "paid", "stamped": true }));
        assert!(matches!(
            last_plan(&recording).kind,
            QueryKind::FindOneAndReplace { options: ReplaceOptions { return_updated: true }, .. }
        ));
    }

    #[tokio::test]
    async fn remove_all_deletes_without_filter() {
        let (datastore, recording) = bound(vec![doc! {}, doc! {}], Datastore::builder("Orders")).await;

        let ack = datastore.remove_all().await.unwrap();

        assert_eq!(ack.deleted_count, 2);
        assert_eq!(*recording.deletes.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn paginated_fetch_always_sends_the_window() {
        let (datastore, recording) = bound(vec![], Datastore::builder("Orders")).await;

        datastore
            .fetch_paginated(20, 10, vec![Sort::new("createdAt", SortDirection::Desc)])
            .await
            .unwrap();

        let plan = last_plan(&recording);
        assert_eq!((plan.skip, plan.limit), (Some(20), Some(10)));
        assert_eq!(plan.sort, Some(vec![Sort::desc("createdAt")]));
    }

    #[tokio::test]
    async fn raw_fetch_leaves_out_an_empty_sort() {
        let (datastore, recording) = bound(vec![], Datastore::builder("Orders")).await;

        datastore
            .fetch_many_raw(Some(Filter::eq("status", "open")), Some(PaginationSort::new().limit(5)))
            .await
            .unwrap();

        let plan = last_plan(&recording);
        assert_eq!(plan.limit, Some(5));
        assert_eq!(plan.sort, None);
    }

    #[tokio::test]
    async fn populated_fetch_carries_every_path() {
        let (datastore, recording) = bound(vec![], Datastore::builder("Orders")).await;

        datastore
            .fetch_populated(Filter::eq("status", "open"), PaginationSort::new(), ["customer", "items"])
            .await
            .unwrap();

        let paths: Vec<_> = last_plan(&recording)
            .populate
            .into_iter()
            .map(|spec| spec.path)
            .collect();
        assert_eq!(paths, vec!["customer", "items"]);
    }

    #[tokio::test]
    async fn page_metadata_follows_the_count() {
        let rows = (0..3).map(|i| doc! { "_id": i }).collect();
        let (datastore, _) = bound(rows, Datastore::builder("Orders")).await;

        let page = datastore
            .fetch_page(&PaginationParams::new(1, 2), vec![])
            .await
            .unwrap();

        // The recording backend ignores the window, so all rows come back.
        assert_eq!(page.count, 3);
        assert_eq!(page.previous_page, None);
        assert_eq!(page.next_page, None);
    }
}
