use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mea::rwlock::RwLock;
use mongodb::{
    Client, Collection, Database,
    options::{ClientOptions, Credential, ReturnDocument, Tls, TlsOptions},
};
use std::{collections::HashMap, sync::Arc};

use docbind_core::{
    backend::{Connection, Connector, DeleteAck, Model, ModelBackend, QueryKind, QueryPlan},
    config::ConnectionConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    options::{PopulateSpec, Projection},
    populate::{embed, referenced_ids},
    query::{Expr, Sort},
    schema::Schema,
};

use crate::query::MongoQueryTranslator;

/// Key under which discriminator models tag their documents.
pub const DISCRIMINATOR_KEY: &str = "__t";

/// Database used when the connection string names none.
const DEFAULT_DATABASE: &str = "test";

/// Connects to MongoDB deployments.
#[derive(Debug, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }

    async fn client_options(config: &ConnectionConfig) -> DocumentStoreResult<ClientOptions> {
        let mut options = ClientOptions::parse(&config.host)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some(username) = &config.username {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(config.password.clone())
                    .build(),
            );
        }

        if let Some(tls) = &config.tls {
            // Fail on unreadable material before the driver tries to use it.
            tls.load()?;

            options.tls = Some(Tls::Enabled(
                TlsOptions::builder()
                    .ca_file_path(tls.ca_file.clone())
                    .cert_key_file_path(tls.cert_key_file.clone())
                    .build(),
            ));
        }

        Ok(options)
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, config: &ConnectionConfig) -> DocumentStoreResult<Arc<dyn Connection>> {
        let options = Self::client_options(config).await?;
        let database = options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let client = Client::with_options(options)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        tracing::debug!(host = %config.host, database = %database, "connected to MongoDB");

        Ok(Arc::new(MongoConnection::new(client.database(&database))))
    }
}

#[derive(Debug, Clone)]
struct ModelEntry {
    collection: String,
    discriminator: Option<String>,
    schema: Schema,
}

type ModelTable = Arc<RwLock<HashMap<String, ModelEntry>>>;

/// A connection to one MongoDB database.
#[derive(Debug)]
pub struct MongoConnection {
    database: Database,
    models: ModelTable,
}

impl MongoConnection {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn bind(&self, name: &str, entry: ModelEntry) -> Model {
        self.models
            .write()
            .await
            .insert(name.to_string(), entry.clone());

        Model::new(Arc::new(MongoModel {
            name: name.to_string(),
            collection: self.database.collection(&entry.collection),
            entry,
            database: self.database.clone(),
            models: self.models.clone(),
        }))
    }
}

#[async_trait]
impl Connection for MongoConnection {
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

/// A model over one MongoDB collection, optionally narrowed to one
/// discriminator.
#[derive(Debug)]
pub struct MongoModel {
    name: String,
    entry: ModelEntry,
    collection: Collection<Document>,
    database: Database,
    models: ModelTable,
}

impl MongoModel {
    /// Translates `filter` and narrows it to this model's discriminator.
    fn scoped_filter(&self, filter: Option<&Expr>) -> DocumentStoreResult<Document> {
        let filter = MongoQueryTranslator::filter(filter)?;

        Ok(match &self.entry.discriminator {
            None => filter,
            Some(tag) if filter.is_empty() => doc! { DISCRIMINATOR_KEY: tag.as_str() },
            Some(tag) => doc! { "$and": [filter, { DISCRIMINATOR_KEY: tag.as_str() }] },
        })
    }

    fn tag(&self, document: &mut Document) {
        if let Some(tag) = &self.entry.discriminator {
            document.insert(DISCRIMINATOR_KEY, tag.clone());
        }
    }

    async fn find(&self, filter: Document, plan: &QueryPlan) -> DocumentStoreResult<Vec<Document>> {
        let mut find = self.collection.find(filter);

        if let Some(select) = &plan.select {
            find = find.projection(select.to_document());
        }
        if let Some(sort) = &plan.sort {
            find = find.sort(Sort::to_document(sort));
        }
        if let Some(limit) = plan.limit.filter(|n| *n > 0) {
            find = find.limit(limit as i64);
        }
        if let Some(skip) = plan.skip.filter(|n| *n > 0) {
            find = find.skip(skip);
        }

        find.await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn find_one(&self, filter: Document, plan: &QueryPlan) -> DocumentStoreResult<Option<Document>> {
        let mut find = self.collection.find_one(filter);

        if let Some(select) = &plan.select {
            find = find.projection(select.to_document());
        }
        if let Some(sort) = &plan.sort {
            find = find.sort(Sort::to_document(sort));
        }
        if let Some(skip) = plan.skip.filter(|n| *n > 0) {
            find = find.skip(skip);
        }

        find.await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn replace(
        &self,
        filter: Document,
        mut replacement: Document,
        return_updated: bool,
        plan: &QueryPlan,
    ) -> DocumentStoreResult<Option<Document>> {
        self.tag(&mut replacement);

        let mut replace = self
            .collection
            .find_one_and_replace(filter, replacement)
            .return_document(if return_updated {
                ReturnDocument::After
            } else {
                ReturnDocument::Before
            });

        if let Some(select) = &plan.select {
            replace = replace.projection(select.to_document());
        }
        if let Some(sort) = &plan.sort {
            replace = replace.sort(Sort::to_document(sort));
        }

        replace
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
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
        if ids.is_empty() {
            embed(documents, spec, &[]);
            return Ok(());
        }

        let mut filter = doc! { "_id": { "$in": ids } };
        if let Some(tag) = &target.discriminator {
            filter.insert(DISCRIMINATOR_KEY, tag.clone());
        }

        let collection = self.database.collection::<Document>(&target.collection);
        let mut find = collection.find(filter);

        if let Some(select) = spec.select.as_ref().filter(|select| !select.is_empty()) {
            find = find.projection(with_id(select));
        }
        if let Some(sort) = spec
            .options
            .as_ref()
            .map(|options| &options.sort)
            .filter(|sort| !sort.is_empty())
        {
            find = find.sort(Sort::to_document(sort));
        }

        let related = find
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        embed(documents, spec, &related);

        Ok(())
    }
}

/// The projection document with `_id` forced in, so populated documents can
/// be matched back to their references.
fn with_id(select: &Projection) -> Document {
    let mut projection = select.to_document();

    if select.is_inclusive() {
        projection.insert("_id", 1);
    } else {
        projection.remove("_id");
    }

    projection
}

#[async_trait]
impl ModelBackend for MongoModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, plan: QueryPlan) -> DocumentStoreResult<Vec<Document>> {
        let mut results = match &plan.kind {
            QueryKind::Find { filter } => {
                self.find(self.scoped_filter(filter.as_ref())?, &plan)
                    .await?
            }
            QueryKind::FindOne { filter } => self
                .find_one(self.scoped_filter(filter.as_ref())?, &plan)
                .await?
                .into_iter()
                .collect(),
            QueryKind::FindById { id } => {
                let mut filter = self.scoped_filter(None)?;
                filter.insert("_id", id.clone());

                self.find_one(filter, &plan)
                    .await?
                    .into_iter()
                    .collect()
            }
            QueryKind::FindOneAndReplace { filter, replacement, options } => self
                .replace(
                    self.scoped_filter(filter.as_ref())?,
                    replacement.clone(),
                    options.return_updated,
                    &plan,
                )
                .await?
                .into_iter()
                .collect(),
        };

        for spec in &plan.populate {
            self.populate(&mut results, spec).await?;
        }

        Ok(results)
    }

    async fn create(&self, mut document: Document) -> DocumentStoreResult<Document> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        self.tag(&mut document);

        self.collection
            .insert_one(&document)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(document)
    }

    async fn delete_by_id(&self, id: Bson) -> DocumentStoreResult<DeleteAck> {
        let mut filter = self.scoped_filter(None)?;
        filter.insert("_id", id);

        let result = self
            .collection
            .delete_one(filter)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(DeleteAck { deleted_count: result.deleted_count })
    }

    async fn delete_all(&self, filter: Option<Expr>) -> DocumentStoreResult<DeleteAck> {
        let result = self
            .collection
            .delete_many(self.scoped_filter(filter.as_ref())?)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(DeleteAck { deleted_count: result.deleted_count })
    }

    async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.collection
            .count_documents(self.scoped_filter(filter.as_ref())?)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }
}
