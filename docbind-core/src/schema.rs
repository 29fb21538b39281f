//! Shape descriptors passed to a connection when a model is bound.
//!
//! docbind does not validate documents against a schema; the store does.
//! The one thing the composition layer relies on is the reference table: a
//! field declared with [`FieldDef::reference`] names the entity whose
//! documents replace its ids when the field is populated.

use serde::{Deserialize, Serialize};

/// Loose type tag for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Any,
    String,
    Number,
    Boolean,
    Date,
    Document,
    Array,
    ObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Entity name this field points at, if it holds references.
    #[serde(default)]
    pub reference: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind, required: false, reference: None }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as holding ids (or an array of ids) of `entity`.
    pub fn reference(mut self, entity: impl Into<String>) -> Self {
        self.reference = Some(entity.into());
        self
    }
}

/// An ordered list of field descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The entity referenced by `path`, if the field is a reference.
    pub fn reference_of(&self, path: &str) -> Option<&str> {
        self.field(path)
            .and_then(|f| f.reference.as_deref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    /// Shorthand for a reference field holding a single id.
    pub fn reference(self, name: impl Into<String>, entity: impl Into<String>) -> Self {
        self.field(FieldDef::new(name, FieldKind::ObjectId).reference(entity))
    }

    /// Shorthand for a reference field holding an array of ids.
    pub fn references(self, name: impl Into<String>, entity: impl Into<String>) -> Self {
        self.field(FieldDef::new(name, FieldKind::Array).reference(entity))
    }

    pub fn build(self) -> Schema {
        Schema { fields: self.fields }
    }
}
