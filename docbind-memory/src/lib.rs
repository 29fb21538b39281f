//! In-memory backend for docbind.
//!
//! This crate implements the store-access interface of `docbind-core` over
//! plain vectors of BSON documents. It is the fake store in tests and a
//! development backend that needs no database.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Shared stores per host** - Connections to the same host see the same data
//! - **Full query support** - Filters on dotted paths, multi-key sort, skip/limit, projection
//! - **Population** - Reference fields resolved through the schema's reference table
//! - **Discriminators** - Derived models share the base collection, tagged with `__t`
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::prelude::*;
//! use docbind_memory::InMemoryConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new(Arc::new(InMemoryConnector::new()));
//!     registry.register_datastore(Datastore::new("Orders", Schema::default()), None).await?;
//!     registry.init(ConnectionConfig::new("mem://shop")).await?;
//!
//!     let orders = registry.get_datastore("Orders").await?;
//!     orders.create(doc! { "status": "open" }).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_memory;

mod evaluator;
pub mod store;

pub use store::{
    DISCRIMINATOR_KEY, InMemoryConnection, InMemoryConnector, InMemoryModel, InMemoryStore,
};
