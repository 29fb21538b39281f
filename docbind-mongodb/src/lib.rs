//! MongoDB backend for docbind.
//!
//! This crate implements the store-access interface of `docbind-core` on the
//! official `mongodb` driver.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docbind = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Credentials and TLS** - Taken from the connection configuration
//! - **Native queries** - Filters, projections, sort, skip and limit run in MongoDB
//! - **Population** - Reference fields resolved with one `$in` query per path
//! - **Discriminators** - Derived models share the base collection, tagged with `__t`
//!
//! # Example
//!
//! ```ignore
//! use docbind::{prelude::*, mongodb::MongoConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new(Arc::new(MongoConnector::new()));
//!     registry.register_datastore(Datastore::new("Orders", Schema::default()), None).await?;
//!     registry
//!         .init(ConnectionConfig::new("mongodb://localhost:27017/shop").with_credentials("svc", "secret"))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_mongodb;

mod query;
pub mod store;

pub use store::{DISCRIMINATOR_KEY, MongoConnection, MongoConnector, MongoModel};
