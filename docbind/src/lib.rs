//! Main docbind crate providing a unified interface to the data-access layer.
//!
//! This crate is the primary entry point for users of docbind. It re-exports
//! the core types from `docbind-core`, the `#[derive(Entity)]` macro and the
//! available storage backends.
//!
//! # Features
//!
//! - **Composable query options** - Condition, pagination/sort, projection and populate in any combination
//! - **Deferred datastore lookups** - Ask for a datastore before its connection exists
//! - **Multiple connections** - A primary connection plus any number of named ones
//! - **Middleware** - Create, pre-check and post-check hooks per datastore
//! - **Multiple backends** - In-memory and MongoDB behind the same traits
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::{prelude::*, memory::InMemoryConnector};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! #[entity(name = "Orders")]
//! pub struct Order {
//!     pub status: String,
//!     pub total: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new(Arc::new(InMemoryConnector::new()));
//!
//!     // Datastores can be registered and looked up before any connection exists.
//!     registry.register_datastore(Datastore::for_entity::<Order>(), None).await?;
//!     let lookup = registry.get_datastore("Orders");
//!
//!     registry.init(ConnectionConfig::new("mem://shop")).await?;
//!     let orders = lookup.await?;
//!
//!     orders.typed::<Order>().create(&Order { status: "open".into(), total: 12 }).await?;
//!
//!     let open = orders
//!         .typed::<Order>()
//!         .fetch_many(
//!             QueryOptions::builder()
//!                 .condition(Filter::eq("status", "open"))
//!                 .limit(10)
//!                 .sort("createdAt", SortDirection::Desc),
//!         )
//!         .await?;
//!
//!     println!("Open orders: {open:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Named connections
//!
//! `init` with a list connects every entry concurrently. Each entry needs an
//! `id`, and binds the datastores registered under that id:
//!
//! ```ignore
//! registry.register_datastore(Datastore::new("Invoices", Schema::default()), Some("billing")).await?;
//! registry
//!     .init(vec![
//!         ConnectionConfig::new("mongodb://billing.internal/ledger").with_id("billing"),
//!         ConnectionConfig::new("mongodb://audit.internal/log").with_id("audit"),
//!     ])
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docbind_core::{
    backend, compose, config, datastore, entity, error, factory, middleware, options, page, populate,
    query, registry, schema,
};
pub use docbind_macros::Entity;

// Re-export BSON types for convenience
pub use bson;

pub use async_trait::async_trait;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docbind_memory::{
        DISCRIMINATOR_KEY, InMemoryConnection, InMemoryConnector, InMemoryModel, InMemoryStore,
    };
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docbind_mongodb::{DISCRIMINATOR_KEY, MongoConnection, MongoConnector, MongoModel};
}
