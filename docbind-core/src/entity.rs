//! Typed entities and their conversion to and from store documents.
//!
//! Datastores work on BSON [`Document`]s. Implement [`Entity`] (or derive it
//! with `#[derive(Entity)]`) to get a typed view through
//! [`Datastore::typed`](crate::datastore::Datastore::typed).
//!
//! # Example
//!
//! ```ignore
//! use docbind::entity::Entity;
//! use bson::oid::ObjectId;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Order {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub status: String,
//! }
//!
//! impl Entity for Order {
//!     fn entity_name() -> &'static str {
//!         "Orders"
//!     }
//! }
//! ```

use bson::{Bson, Document, deserialize_from_document, serialize_to_bson, serialize_to_document};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_value, to_value};

use crate::{error::DocumentStoreResult, schema::Schema};

/// A type stored through a datastore.
///
/// The entity name is the registry key and the model name; it must be unique
/// within a connection scope.
pub trait Entity: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns the entity name (e.g. `"Orders"`).
    fn entity_name() -> &'static str;

    /// The schema the model is bound with. Defaults to an empty schema.
    fn schema() -> Schema {
        Schema::default()
    }

    /// The base entity when this entity is a discriminator of another.
    fn base_entity() -> Option<&'static str> {
        None
    }
}

/// Serialization helpers, implemented for every [`Entity`].
pub trait EntityExt: Entity {
    /// Converts this entity to a store document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or does not produce a document.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Creates an entity from a store document.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;

    /// Converts this entity to a JSON value.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates an entity from a JSON value.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<E: Entity> EntityExt for E {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(document)?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Converts a JSON object into a store document.
pub fn document_from_json(value: Value) -> DocumentStoreResult<Document> {
    match serialize_to_bson(&value)? {
        Bson::Document(document) => Ok(document),
        other => Err(crate::error::DocumentStoreError::InvalidDocument(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        status: String,
        total: i32,
    }

    impl Entity for Order {
        fn entity_name() -> &'static str {
            "Orders"
        }
    }

    #[test]
    fn converts_through_documents() {
        let order = Order { status: "open".into(), total: 5 };

        let document = order.to_document().unwrap();
        assert_eq!(document, doc! { "status": "open", "total": 5 });
        assert_eq!(Order::from_document(document).unwrap(), order);
    }

    #[test]
    fn json_objects_become_documents() {
        assert_eq!(
            document_from_json(json!({ "status": "open" })).unwrap(),
            doc! { "status": "open" }
        );
        assert!(document_from_json(json!([1, 2])).is_err());
    }
}
