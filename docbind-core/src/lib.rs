//! A data-access layer that binds named datastores to document-store
//! connections.
//!
//! This crate is the core of the docbind project and provides:
//!
//! - **Query options** ([`options`]) - Condition, pagination/sort, projection and populate aspects
//! - **Query composition** ([`compose`]) - Turns options into exactly one store query
//! - **Datastores** ([`datastore`]) - Named, schema-carrying handles with fetch/write operations
//! - **Middleware** ([`middleware`]) - Create, pre-check and post-check hooks
//! - **Connection registry** ([`registry`]) - Primary and named connections, deferred lookups
//! - **Store-access interface** ([`backend`]) - Traits implemented by storage backends
//! - **Filters** ([`query`]) - Filter expressions, sort keys and the query visitor
//! - **Configuration** ([`config`]) - Serde connection settings
//! - **Error handling** ([`error`]) - The shared error and result types
//!
//! # Example
//!
//! ```ignore
//! use docbind::prelude::*;
//! use docbind::memory::InMemoryConnector;
//!
//! let registry = ConnectionRegistry::new(Arc::new(InMemoryConnector::new()));
//! registry.register_datastore(Datastore::new("Orders", Schema::default()), None).await?;
//! registry.init(ConnectionConfig::new("mem://shop")).await?;
//!
//! let orders = registry.get_datastore("Orders").await?;
//! let all = orders.fetch_many(QueryOptions::new()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_core;

pub mod backend;
pub mod compose;
pub mod config;
pub mod datastore;
pub mod entity;
pub mod error;
pub mod factory;
pub mod middleware;
pub mod options;
pub mod page;
pub mod populate;
pub mod query;
pub mod registry;
pub mod schema;

#[cfg(test)]
mod testing;
