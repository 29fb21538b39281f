//! Convenient re-exports of commonly used types from docbind.
//!
//! ```ignore
//! use docbind::prelude::*;
//! ```
//!
//! This provides access to:
//! - The connection registry and its configuration
//! - Datastores, entities and middleware
//! - Query options, filters and sort keys
//! - Error types

pub use std::sync::Arc;

pub use bson::{Bson, Document, doc, oid::ObjectId};

pub use docbind_core::{
    backend::{Connection, Connector, DeleteAck, Model, ModelBackend},
    config::{ConnectionConfig, InitConfig, TlsConfig},
    datastore::{Datastore, DatastoreBuilder, TypedDatastore},
    entity::{Entity, EntityExt},
    error::{DocumentStoreError, DocumentStoreResult},
    factory::DatastoreFactory,
    middleware::DatastoreMiddleware,
    options::{ByIdOptions, PaginationSort, PopulateSpec, Projection, QueryOptions},
    page::{Page, PaginationParams},
    query::{Expr, Filter, Sort, SortDirection},
    registry::{ConnectionRegistry, ConnectionStatus},
    schema::{FieldDef, FieldKind, Schema},
};
pub use docbind_macros::Entity;
