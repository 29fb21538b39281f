//! Store fakes shared by the unit tests.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing::{Event, Level, Subscriber, field::Field};
use tracing_subscriber::{
    layer::{Context, Layer, SubscriberExt},
    registry::Registry,
};

use crate::{
    backend::{Connection, Connector, DeleteAck, Model, ModelBackend, QueryPlan},
    config::ConnectionConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    query::Expr,
    schema::Schema,
};

/// A model that holds nothing.
#[derive(Debug)]
pub struct Empty(pub String);

#[async_trait]
impl ModelBackend for Empty {
    fn name(&self) -> &str {
        &self.0
    }

    async fn execute(&self, _plan: QueryPlan) -> DocumentStoreResult<Vec<Document>> {
        Ok(vec![])
    }

    async fn create(&self, document: Document) -> DocumentStoreResult<Document> {
        Ok(document)
    }

    async fn delete_by_id(&self, _id: Bson) -> DocumentStoreResult<DeleteAck> {
        Ok(DeleteAck::default())
    }

    async fn delete_all(&self, _filter: Option<Expr>) -> DocumentStoreResult<DeleteAck> {
        Ok(DeleteAck::default())
    }

    async fn count(&self, _filter: Option<Expr>) -> DocumentStoreResult<u64> {
        Ok(0)
    }
}

#[derive(Debug)]
pub struct EmptyConnection;

#[async_trait]
impl Connection for EmptyConnection {
    async fn bind_model(&self, name: &str, _schema: &Schema) -> DocumentStoreResult<Model> {
        Ok(Model::new(Arc::new(Empty(name.to_owned()))))
    }

    async fn bind_discriminator(
        &self,
        name: &str,
        schema: &Schema,
        _base: &str,
    ) -> DocumentStoreResult<Model> {
        self.bind_model(name, schema).await
    }
}

/// How long a `slow://` host takes to connect.
pub const SLOW_CONNECT: Duration = Duration::from_secs(2);

/// Connects to anything except `down://` hosts and counts the attempts.
/// `slow://` hosts connect after [`SLOW_CONNECT`].
#[derive(Debug, Default)]
pub struct CountingConnector {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, config: &ConnectionConfig) -> DocumentStoreResult<Arc<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if config.host.starts_with("down://") {
            return Err(DocumentStoreError::Initialization(format!(
                "{} unreachable",
                config.host
            )));
        }
        if config.host.starts_with("slow://") {
            tokio::time::sleep(SLOW_CONNECT).await;
        }

        Ok(Arc::new(EmptyConnection))
    }
}

/// Records the message of every `warn!` event emitted while installed.
#[derive(Clone, Default)]
pub struct Warnings(Arc<Mutex<Vec<String>>>);

impl Warnings {
    /// Captures warnings on this thread until the guard is dropped.
    pub fn capture() -> (Self, tracing::subscriber::DefaultGuard) {
        let warnings = Self::default();
        let guard = tracing::subscriber::set_default(Registry::default().with(warnings.clone()));
        (warnings, guard)
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl<S: Subscriber> Layer<S> for Warnings {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }

        let mut message = Message(String::new());
        event.record(&mut message);
        self.0.lock().unwrap().push(message.0);
    }
}

struct Message(String);

impl tracing::field::Visit for Message {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
