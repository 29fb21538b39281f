//! The connection registry: owns connections, binds datastores to them and
//! hands bound datastores out by name.
//!
//! Datastores are registered either globally (bound by the primary
//! connection) or under a scope id (bound by the named connection with that
//! id). [`ConnectionRegistry::get_datastore`] resolves as soon as a datastore
//! with the requested name is bound; until then the lookup is parked. A name
//! that is never registered parks forever, so callers that need a deadline
//! wrap the lookup in their own timeout.
//!
//! ```ignore
//! let registry = ConnectionRegistry::new(Arc::new(MongoConnector::new()));
//! registry.register_datastore(Datastore::for_entity::<Order>(), None).await?;
//!
//! let orders = registry.get_datastore("Orders");
//! registry.init(ConnectionConfig::new("mongodb://localhost:27017/shop")).await?;
//! let orders = orders.await?;
//! ```

use futures::{channel::oneshot, future::join_all};
use mea::mutex::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{
    backend::{Connection, Connector},
    config::{ConnectionConfig, InitConfig},
    datastore::Datastore,
    error::{DocumentStoreError, DocumentStoreResult},
};

const PRIMARY: &str = "<primary>";

static INSTALLED: OnceLock<Arc<ConnectionRegistry>> = OnceLock::new();

/// Lifecycle of one connection scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Uninitialized,
    Connecting,
    Ready,
}

#[derive(Default)]
struct Scope {
    status: ConnectionStatus,
    connection: Option<Arc<dyn Connection>>,
    datastores: Vec<Arc<Datastore>>,
}

#[derive(Default)]
struct RegistryState {
    primary: Scope,
    scoped: Vec<(String, Scope)>,
    pending: HashMap<String, VecDeque<oneshot::Sender<Arc<Datastore>>>>,
}

impl RegistryState {
    fn scope(&self, id: Option<&str>) -> Option<&Scope> {
        match id {
            None => Some(&self.primary),
            Some(id) => self
                .scoped
                .iter()
                .find(|(scope_id, _)| scope_id == id)
                .map(|(_, scope)| scope),
        }
    }

    fn scope_mut(&mut self, id: Option<&str>) -> &mut Scope {
        let Some(id) = id else {
            return &mut self.primary;
        };

        let index = match self.scoped.iter().position(|(scope_id, _)| scope_id == id) {
            Some(index) => index,
            None => {
                self.scoped.push((id.to_owned(), Scope::default()));
                self.scoped.len() - 1
            }
        };

        &mut self.scoped[index].1
    }

    /// The first bound datastore named `name`, global registrations first.
    async fn find_bound(&self, name: &str) -> Option<Arc<Datastore>> {
        let candidates = self
            .primary
            .datastores
            .iter()
            .chain(self.scoped.iter().flat_map(|(_, scope)| &scope.datastores))
            .filter(|datastore| datastore.name() == name);

        for datastore in candidates {
            if datastore.is_bound().await {
                return Some(datastore.clone());
            }
        }

        None
    }

    /// Hands `datastore` to every lookup parked on its name, oldest first.
    fn resolve(&mut self, datastore: &Arc<Datastore>) -> usize {
        let Some(waiters) = self.pending.remove(datastore.name()) else {
            return 0;
        };

        let count = waiters.len();
        for waiter in waiters {
            // The receiver is gone when the caller stopped waiting.
            let _ = waiter.send(datastore.clone());
        }

        count
    }
}

pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    /// Creates an empty registry that establishes connections through
    /// `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Makes `registry` the process-wide default.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::Initialization`] if a default is
    /// already installed.
    pub fn install_default(registry: Arc<ConnectionRegistry>) -> DocumentStoreResult<()> {
        INSTALLED.set(registry).map_err(|_| {
            DocumentStoreError::Initialization("a default registry is already installed".to_string())
        })
    }

    /// The process-wide default registry, if one was installed.
    pub fn installed() -> Option<Arc<ConnectionRegistry>> {
        INSTALLED.get().cloned()
    }

    /// Registers a datastore globally (`scope` is `None`) or under a scope id.
    ///
    /// Returns `false` without changing anything when a datastore with the
    /// same name is already registered in that scope. When the scope is
    /// already ready the datastore is bound right away and parked lookups for
    /// its name are resolved.
    ///
    /// # Errors
    ///
    /// Returns the binding error when the scope is ready and the model cannot
    /// be bound; the datastore is then not registered.
    pub async fn register_datastore(
        &self,
        datastore: impl Into<Arc<Datastore>>,
        scope: Option<&str>,
    ) -> DocumentStoreResult<bool> {
        let datastore = datastore.into();
        let mut state = self.state.lock().await;
        let target = state.scope_mut(scope);

        if target
            .datastores
            .iter()
            .any(|registered| registered.name() == datastore.name())
        {
            tracing::warn!(
                datastore = datastore.name(),
                scope = scope.unwrap_or(PRIMARY),
                "datastore already registered"
            );
            return Ok(false);
        }

        let connection = match target.status {
            ConnectionStatus::Ready => target.connection.clone(),
            _ => None,
        };

        let Some(connection) = connection else {
            target.datastores.push(datastore);
            return Ok(true);
        };

        datastore.init(connection.as_ref()).await?;
        target.datastores.push(datastore.clone());
        let resolved = state.resolve(&datastore);

        tracing::debug!(
            datastore = datastore.name(),
            scope = scope.unwrap_or(PRIMARY),
            resolved,
            "bound late registration"
        );

        Ok(true)
    }

    /// Returns the bound datastore named `name`, waiting until one is bound.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::RegistryClosed`] only if the registry
    /// is dropped while the lookup is parked.
    pub async fn get_datastore(&self, name: &str) -> DocumentStoreResult<Arc<Datastore>> {
        let receiver = {
            let mut state = self.state.lock().await;

            if let Some(datastore) = state.find_bound(name).await {
                return Ok(datastore);
            }

            let (sender, receiver) = oneshot::channel();
            state
                .pending
                .entry(name.to_owned())
                .or_default()
                .push_back(sender);
            tracing::debug!(datastore = name, "parked lookup until bound");

            receiver
        };

        receiver
            .await
            .map_err(|_| DocumentStoreError::RegistryClosed(name.to_owned()))
    }

    /// Establishes the configured connections and binds their datastores.
    ///
    /// A single configuration is the primary connection and binds the global
    /// registrations. A list configures named connections, each binding the
    /// registrations under its id. Connections are established concurrently;
    /// each one binds its datastores and resolves matching parked lookups as
    /// soon as it is up.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::Initialization`] before connecting if
    /// a listed configuration has no id, an id repeats or a scope is already
    /// connecting. Otherwise every connection is attempted and the first
    /// failure is returned; scopes that did connect stay ready.
    pub async fn init(&self, config: impl Into<InitConfig>) -> DocumentStoreResult<()> {
        let targets = scoped_targets(config.into())?;

        {
            let mut state = self.state.lock().await;

            if let Some((scope, _)) = targets.iter().find(|(scope, _)| {
                state
                    .scope(scope.as_deref())
                    .is_some_and(|s| s.status == ConnectionStatus::Connecting)
            }) {
                return Err(DocumentStoreError::Initialization(format!(
                    "scope {} is already connecting",
                    scope.as_deref().unwrap_or(PRIMARY)
                )));
            }

            for (scope, _) in &targets {
                state.scope_mut(scope.as_deref()).status = ConnectionStatus::Connecting;
            }
        }

        // Each scope binds as soon as its own connection is up.
        let outcomes = join_all(
            targets
                .iter()
                .map(|(scope, config)| self.connect_scope(scope.as_deref(), config)),
        )
        .await;

        outcomes.into_iter().collect()
    }

    async fn connect_scope(&self, scope: Option<&str>, config: &ConnectionConfig) -> DocumentStoreResult<()> {
        match self.connector.connect(config).await {
            Ok(connection) => self.bind_scope(scope, connection).await,
            Err(err) => {
                self.fail_scope(scope, config, &err).await;
                Err(err)
            }
        }
    }

    /// The status of the primary connection (`None`) or a named one.
    pub async fn connection_status(&self, scope: Option<&str>) -> ConnectionStatus {
        self.state
            .lock()
            .await
            .scope(scope)
            .map(|scope| scope.status)
            .unwrap_or_default()
    }

    async fn bind_scope(
        &self,
        scope: Option<&str>,
        connection: Arc<dyn Connection>,
    ) -> DocumentStoreResult<()> {
        let mut state = self.state.lock().await;
        let target = state.scope_mut(scope);
        let registered = target.datastores.clone();

        // Discriminators bind through their base, so bases go first.
        let mut ordered = registered.clone();
        ordered.sort_by_key(|datastore| datastore.base().is_some());

        let mut bound = Vec::with_capacity(ordered.len());
        let mut first_error = None;

        for datastore in ordered {
            match datastore.init(connection.as_ref()).await {
                Ok(()) => bound.push(datastore),
                Err(err) => {
                    tracing::error!(
                        datastore = datastore.name(),
                        scope = scope.unwrap_or(PRIMARY),
                        error = %err,
                        "failed to bind datastore"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        target.status = ConnectionStatus::Ready;
        target.connection = Some(connection);

        let resolved: usize = registered
            .iter()
            .filter(|datastore| bound.iter().any(|b| Arc::ptr_eq(b, *datastore)))
            .map(|datastore| state.resolve(datastore))
            .sum();

        tracing::info!(
            scope = scope.unwrap_or(PRIMARY),
            bound = bound.len(),
            resolved,
            "connection ready"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fail_scope(&self, scope: Option<&str>, config: &ConnectionConfig, err: &DocumentStoreError) {
        let mut state = self.state.lock().await;
        let target = state.scope_mut(scope);

        target.status = if target.connection.is_some() {
            ConnectionStatus::Ready
        } else {
            ConnectionStatus::Uninitialized
        };

        tracing::error!(
            scope = scope.unwrap_or(PRIMARY),
            host = %config.host,
            error = %err,
            "connection failed"
        );
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}

/// Pairs each configuration with the scope it binds.
fn scoped_targets(config: InitConfig) -> DocumentStoreResult<Vec<(Option<String>, ConnectionConfig)>> {
    match config {
        InitConfig::Single(config) => Ok(vec![(None, config)]),
        InitConfig::Many(configs) => {
            let mut targets: Vec<(Option<String>, ConnectionConfig)> = Vec::with_capacity(configs.len());

            for config in configs {
                let Some(id) = config.id.clone() else {
                    return Err(DocumentStoreError::Initialization(format!(
                        "connection to {} has no id",
                        config.host
                    )));
                };

                if targets.iter().any(|(scope, _)| scope.as_deref() == Some(&id)) {
                    return Err(DocumentStoreError::Initialization(format!(
                        "connection id {id} is listed twice"
                    )));
                }

                targets.push((Some(id), config));
            }

            Ok(targets)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::Schema,
        testing::{CountingConnector, SLOW_CONNECT, Warnings},
    };
    use std::{sync::atomic::Ordering, time::Duration};
    use tokio::time::timeout;

    fn registry() -> (ConnectionRegistry, Arc<CountingConnector>) {
        let connector = Arc::new(CountingConnector::default());
        (ConnectionRegistry::new(connector.clone()), connector)
    }

    fn orders() -> Datastore {
        Datastore::new("Orders", Schema::default())
    }

    const PATIENCE: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn registering_twice_keeps_the_first_instance_and_warns() {
        let (warnings, _guard) = Warnings::capture();
        let (registry, _) = registry();
        let first = Arc::new(orders());

        assert!(registry.register_datastore(first.clone(), None).await.unwrap());
        assert!(warnings.messages().is_empty());
        assert!(!registry.register_datastore(orders(), None).await.unwrap());
        assert_eq!(warnings.messages(), vec!["datastore already registered".to_string()]);

        registry.init(ConnectionConfig::new("mem://primary")).await.unwrap();
        let found = registry.get_datastore("Orders").await.unwrap();

        assert!(Arc::ptr_eq(&found, &first));
        assert!(found.is_bound().await);
    }

    #[tokio::test]
    async fn lookup_before_init_resolves_once_bound() {
        let (registry, _) = registry();
        registry.register_datastore(orders(), None).await.unwrap();

        let lookup = registry.get_datastore("Orders");
        tokio::pin!(lookup);
        assert!(timeout(PATIENCE, &mut lookup).await.is_err());

        registry.init(ConnectionConfig::new("mem://primary")).await.unwrap();

        let found = timeout(PATIENCE, lookup).await.unwrap().unwrap();
        assert!(found.is_bound().await);
        assert_eq!(registry.connection_status(None).await, ConnectionStatus::Ready);
    }

    #[tokio::test]
    async fn unknown_names_stay_pending_after_init() {
        let (registry, _) = registry();
        registry.register_datastore(orders(), None).await.unwrap();
        registry.init(ConnectionConfig::new("mem://primary")).await.unwrap();

        assert!(timeout(PATIENCE, registry.get_datastore("Invoices")).await.is_err());
    }

    #[tokio::test]
    async fn late_global_registration_binds_and_resolves() {
        let (registry, _) = registry();
        registry.init(ConnectionConfig::new("mem://primary")).await.unwrap();

        let lookup = registry.get_datastore("Orders");
        tokio::pin!(lookup);
        assert!(timeout(PATIENCE, &mut lookup).await.is_err());

        registry.register_datastore(orders(), None).await.unwrap();

        assert!(timeout(PATIENCE, lookup).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn named_connections_bind_their_own_registrations() {
        let (registry, connector) = registry();
        registry.register_datastore(orders(), Some("eu")).await.unwrap();
        registry
            .register_datastore(Datastore::new("Invoices", Schema::default()), Some("us"))
            .await
            .unwrap();

        registry
            .init(vec![
                ConnectionConfig::new("mem://eu").with_id("eu"),
                ConnectionConfig::new("mem://us").with_id("us"),
            ])
            .await
            .unwrap();

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert!(registry.get_datastore("Orders").await.unwrap().is_bound().await);
        assert!(registry.get_datastore("Invoices").await.unwrap().is_bound().await);
        assert_eq!(registry.connection_status(None).await, ConnectionStatus::Uninitialized);
        assert_eq!(registry.connection_status(Some("eu")).await, ConnectionStatus::Ready);
    }

    #[tokio::test]
    async fn late_scoped_registration_binds_immediately() {
        let (registry, _) = registry();
        registry
            .init(vec![ConnectionConfig::new("mem://eu").with_id("eu")])
            .await
            .unwrap();

        registry.register_datastore(orders(), Some("eu")).await.unwrap();

        let found = timeout(PATIENCE, registry.get_datastore("Orders")).await.unwrap().unwrap();
        assert!(found.is_bound().await);
    }

    #[tokio::test]
    async fn listed_configurations_need_ids() {
        let (registry, connector) = registry();

        let result = registry
            .init(vec![
                ConnectionConfig::new("mem://eu").with_id("eu"),
                ConnectionConfig::new("mem://anonymous"),
            ])
            .await;

        assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_connection_is_reported_and_others_still_bind() {
        let (registry, _) = registry();
        registry.register_datastore(orders(), Some("eu")).await.unwrap();

        let result = registry
            .init(vec![
                ConnectionConfig::new("mem://eu").with_id("eu"),
                ConnectionConfig::new("down://us").with_id("us"),
            ])
            .await;

        assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));
        assert_eq!(registry.connection_status(Some("us")).await, ConnectionStatus::Uninitialized);
        assert_eq!(registry.connection_status(Some("eu")).await, ConnectionStatus::Ready);
        assert!(registry.get_datastore("Orders").await.is_ok());
    }

    #[tokio::test]
    async fn fast_scope_binds_without_waiting_for_slow_ones() {
        let (registry, _) = registry();
        registry.register_datastore(orders(), Some("eu")).await.unwrap();

        let (init, (found, us_status)) = tokio::join!(
            registry.init(vec![
                ConnectionConfig::new("mem://eu").with_id("eu"),
                ConnectionConfig::new("slow://us").with_id("us"),
            ]),
            async {
                let found = timeout(SLOW_CONNECT / 4, registry.get_datastore("Orders")).await;
                (found, registry.connection_status(Some("us")).await)
            },
        );

        assert!(found.unwrap().unwrap().is_bound().await);
        assert_eq!(us_status, ConnectionStatus::Connecting);
        init.unwrap();
        assert_eq!(registry.connection_status(Some("us")).await, ConnectionStatus::Ready);
    }
}
