//! Ad-hoc datastores created by name at runtime.

use mea::mutex::Mutex;
use std::{collections::HashMap, sync::Arc};

use crate::{
    datastore::Datastore,
    error::DocumentStoreResult,
    registry::ConnectionRegistry,
    schema::Schema,
};

/// Creates datastores on demand and caches them by name.
///
/// The first request for a name registers a datastore globally on the
/// registry and waits for the primary connection to bind it. Later requests
/// return the cached instance and ignore the schema.
#[derive(Debug)]
pub struct DatastoreFactory {
    registry: Arc<ConnectionRegistry>,
    cache: Mutex<HashMap<String, Arc<Datastore>>>,
}

impl DatastoreFactory {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn datastore(&self, name: &str, schema: Schema) -> DocumentStoreResult<Arc<Datastore>> {
        {
            let mut cache = self.cache.lock().await;

            if let Some(datastore) = cache.get(name)
                && datastore.is_bound().await
            {
                return Ok(datastore.clone());
            }

            if !cache.contains_key(name) {
                let datastore = Arc::new(Datastore::new(name, schema));
                if self.registry.register_datastore(datastore.clone(), None).await? {
                    cache.insert(name.to_owned(), datastore);
                }
            }
        }

        // Parks until the primary connection binds it.
        let datastore = self.registry.get_datastore(name).await?;
        self.cache
            .lock()
            .await
            .entry(name.to_owned())
            .or_insert_with(|| datastore.clone());

        Ok(datastore)
    }
}
