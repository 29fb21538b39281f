//! In-memory storage, connections and models.
//!
//! An [`InMemoryStore`] holds named collections of documents behind an
//! async-aware read-write lock. [`InMemoryConnector`] hands out one store per
//! host, so two connections to the same host see the same data. Models bound
//! on a connection run query plans by scanning their collection.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::{mutex::Mutex, rwlock::RwLock};
use std::{collections::HashMap, sync::Arc};

use docbind_core::{
    backend::{Connection, Connector, DeleteAck, Model, ModelBackend, QueryKind, QueryPlan},
    config::ConnectionConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    options::PopulateSpec,
    populate::{embed, referenced_ids},
    query::{Expr, Filter, Sort},
    schema::Schema,
};

use crate::evaluator::{DocumentEvaluator, compare, project};

/// Key under which discriminator models tag their documents.
pub const DISCRIMINATOR_KEY: &str = "__t";

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage.
///
/// Cloning is cheap; clones share the same collections.
///
/// # Example
///
/// ```ignore
/// use docbind_memory::InMemoryStore;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// store.seed("Orders", vec![doc! { "status": "open" }]).await;
/// assert_eq!(store.documents("Orders").await.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    collections: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends documents to a collection as-is, bypassing models.
    pub async fn seed(&self, collection: &str, documents: Vec<Document>) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    /// A snapshot of a collection in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn list_collections(&self) -> Vec<String> {
        self.collections.read().await.keys().cloned().collect()
    }
}

/// Connects to in-memory stores, one per host.
#[derive(Default, Debug)]
pub struct InMemoryConnector {
    stores: Mutex<HashMap<String, InMemoryStore>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store behind `host`, created empty on first use.
    pub async fn store(&self, host: &str) -> InMemoryStore {
        self.stores
            .lock()
            .await
            .entry(host.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> DocumentStoreResult<Arc<dyn Connection>> {
        // TLS material is read even though nothing encrypts; unreadable files fail here.
        if let Some(tls) = &config.tls {
            tls.load()?;
        }

        tracing::debug!(host = %config.host, "connecting in-memory store");

        Ok(Arc::new(InMemoryConnection::new(self.store(&config.host).await)))
    }
}

#[derive(Debug, Clone)]
struct ModelEntry {
    collection: String,
    discriminator: Option<String>,
    schema: Schema,
}

type ModelTable = Arc<RwLock<HashMap<String, ModelEntry>>>;

/// A connection to one [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemoryConnection {
    store: InMemoryStore,
    models: ModelTable,
}

impl InMemoryConnection {
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn bind(&self, name: &str, entry: ModelEntry) -> Model {
        self.models
            .write()
            .await
            .insert(name.to_string(), entry.clone());

        Model::new(Arc::new(InMemoryModel {
            name: name.to_string(),
            entry,
            store: self.store.clone(),
            models: self.models.clone(),
        }))
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn bind_model(&self, name: &str, schema: &Schema) -> DocumentStoreResult<Model> {
        let entry = ModelEntry {
            collection: name.to_string(),
            discriminator: None,
            schema: schema.clone(),
        };

        Ok(self.bind(name, entry).await)
    }

    async fn bind_discriminator(
        &self,
        name: &str,
        schema: &Schema,
        base: &str,
    ) -> DocumentStoreResult<Model> {
        let collection = self
            .models
            .read()
            .await
            .get(base)
            .map(|entry| entry.collection.clone())
            .ok_or_else(|| DocumentStoreError::ModelNotFound(base.to_string()))?;

        let entry = ModelEntry {
            collection,
            discriminator: Some(name.to_string()),
            schema: schema.clone(),
        };

        Ok(self.bind(name, entry).await)
    }
}

/// A model over one collection, optionally narrowed to one discriminator.
#[derive(Debug)]
pub struct InMemoryModel {
    name: String,
    entry: ModelEntry,
    store: InMemoryStore,
    models: ModelTable,
}

impl InMemoryModel {
    /// Whether the document is visible through this model and matches `filter`.
    fn visible(&self, document: &Document, filter: Option<&Expr>) -> DocumentStoreResult<bool> {
        if let Some(tag) = &self.entry.discriminator
            && document.get_str(DISCRIMINATOR_KEY).ok() != Some(tag.as_str())
        {
            return Ok(false);
        }

        DocumentEvaluator::matches(document, filter)
    }

    fn selection(plan: &QueryPlan) -> Option<Expr> {
        match &plan.kind {
            QueryKind::Find { filter } | QueryKind::FindOne { filter } => filter.clone(),
            QueryKind::FindById { id } => Some(Filter::eq("_id", id.clone())),
            QueryKind::FindOneAndReplace { filter, .. } => filter.clone(),
        }
    }

    /// Indices of the visible matches, ordered by `sort`.
    fn matching(
        &self,
        documents: &[Document],
        filter: Option<&Expr>,
        sort: Option<&[Sort]>,
    ) -> DocumentStoreResult<Vec<usize>> {
        let mut indices = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if self.visible(document, filter)? {
                indices.push(index);
            }
        }

        if let Some(sort) = sort {
            indices.sort_by(|a, b| compare(&documents[*a], &documents[*b], sort));
        }

        Ok(indices)
    }

    async fn replace(
        &self,
        filter: Option<&Expr>,
        sort: Option<&[Sort]>,
        mut replacement: Document,
        return_updated: bool,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut collections = self.store.collections.write().await;
        let documents = collections
            .entry(self.entry.collection.clone())
            .or_default();

        let Some(&index) = self.matching(documents, filter, sort)?.first() else {
            return Ok(vec![]);
        };

        let previous = documents[index].clone();
        if let Some(id) = previous.get("_id") {
            replacement.insert("_id", id.clone());
        }
        self.tag(&mut replacement);
        documents[index] = replacement.clone();

        Ok(vec![if return_updated { replacement } else { previous }])
    }

    fn tag(&self, document: &mut Document) {
        if let Some(tag) = &self.entry.discriminator {
            document.insert(DISCRIMINATOR_KEY, tag.clone());
        }
    }

    fn check_required(&self, document: &Document) -> DocumentStoreResult<()> {
        match self
            .entry
            .schema
            .fields()
            .iter()
            .find(|field| field.required && !document.contains_key(&field.name))
        {
            Some(field) => Err(DocumentStoreError::InvalidDocument(format!(
                "{} requires field {}",
                self.name, field.name
            ))),
            None => Ok(()),
        }
    }

    /// Replaces reference ids with the referenced documents.
    async fn populate(&self, documents: &mut [Document], spec: &PopulateSpec) -> DocumentStoreResult<()> {
        let target = self
            .entry
            .schema
            .reference_of(&spec.path)
            .ok_or_else(|| DocumentStoreError::ModelNotFound(format!("{}.{}", self.name, spec.path)))?;
        let target = self
            .models
            .read()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| DocumentStoreError::ModelNotFound(target.to_string()))?;

        let ids = referenced_ids(documents, &spec.path);
        let sort = spec
            .options
            .as_ref()
            .map(|options| options.sort.as_slice())
            .filter(|sort| !sort.is_empty());

        let mut related: Vec<Document> = self
            .store
            .documents(&target.collection)
            .await
            .into_iter()
            .filter(|document| {
                document.get("_id").is_some_and(|id| ids.contains(id))
                    && target
                        .discriminator
                        .as_deref()
                        .is_none_or(|tag| document.get_str(DISCRIMINATOR_KEY).ok() == Some(tag))
            })
            .collect();

        if let Some(sort) = sort {
            related.sort_by(|a, b| compare(a, b, sort));
        }
        if let Some(select) = &spec.select {
            related = related.iter().map(|document| project(document, select)).collect();
        }

        embed(documents, spec, &related);

        Ok(())
    }
}

#[async_trait]
impl ModelBackend for InMemoryModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, plan: QueryPlan) -> DocumentStoreResult<Vec<Document>> {
        let filter = Self::selection(&plan);
        let sort = plan.sort.as_deref();

        let mut results = match &plan.kind {
            QueryKind::FindOneAndReplace { replacement, options, .. } => {
                self.replace(filter.as_ref(), sort, replacement.clone(), options.return_updated)
                    .await?
            }
            _ => {
                let collections = self.store.collections.read().await;
                let documents = collections
                    .get(&self.entry.collection)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let take = if plan.is_single() {
                    1
                } else {
                    plan.limit.filter(|n| *n > 0).unwrap_or(u64::MAX) as usize
                };

                self.matching(documents, filter.as_ref(), sort)?
                    .into_iter()
                    .skip(plan.skip.unwrap_or(0) as usize)
                    .take(take)
                    .map(|index| documents[index].clone())
                    .collect::<Vec<_>>()
            }
        };

        if let Some(select) = &plan.select {
            results = results.iter().map(|document| project(document, select)).collect();
        }

        for spec in &plan.populate {
            self.populate(&mut results, spec).await?;
        }

        Ok(results)
    }

    async fn create(&self, mut document: Document) -> DocumentStoreResult<Document> {
        self.check_required(&document)?;

        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        self.tag(&mut document);

        let mut collections = self.store.collections.write().await;
        let documents = collections
            .entry(self.entry.collection.clone())
            .or_default();

        if documents.iter().any(|existing| existing.get("_id") == document.get("_id")) {
            return Err(DocumentStoreError::Backend(format!(
                "duplicate _id {} in {}",
                document.get("_id").cloned().unwrap_or(Bson::Null),
                self.entry.collection
            )));
        }

        documents.push(document.clone());

        Ok(document)
    }

    async fn delete_by_id(&self, id: Bson) -> DocumentStoreResult<DeleteAck> {
        self.delete_all(Some(Filter::eq("_id", id))).await
    }

    async fn delete_all(&self, filter: Option<Expr>) -> DocumentStoreResult<DeleteAck> {
        let mut collections = self.store.collections.write().await;
        let Some(documents) = collections.get_mut(&self.entry.collection) else {
            return Ok(DeleteAck::default());
        };

        let mut doomed = Vec::with_capacity(documents.len());
        for document in documents.iter() {
            doomed.push(self.visible(document, filter.as_ref())?);
        }

        let before = documents.len();
        let mut doomed = doomed.into_iter();
        documents.retain(|_| !doomed.next().unwrap_or(false));

        Ok(DeleteAck {
            deleted_count: (before - documents.len()) as u64,
        })
    }

    async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        let collections = self.store.collections.read().await;
        let documents = collections
            .get(&self.entry.collection)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(self.matching(documents, filter.as_ref(), None)?.len() as u64)
    }
}
