//! Model descriptors
//!
//! A [`ModelDescriptor`] is the attribute registry of one model: its table,
//! its fields with their storage names and marshalers, its key declaration
//! and its validation hook. Descriptors are immutable once built and are
//! shared between items through an `Arc`.
//!
//! # Example
//!
//! ```rust
//! use dynamap::model::{Attribute, ModelDescriptor};
//!
//! let users = ModelDescriptor::builder("users")
//!     .attribute(Attribute::string("id").hash_key())
//!     .attribute(Attribute::integer("visits").storage_name("v").default_value(0i64))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(users.storage_name_for("visits").unwrap(), "v");
//! ```

use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dynamap_common::{Error, Result, Value};

use crate::item::Item;
use crate::marshal::{
    BinaryMarshaler, BooleanMarshaler, DateTimeMarshaler, EpochTimeMarshaler, FloatMarshaler,
    IntegerMarshaler, ListMarshaler, MapMarshaler, Marshaler, NumberSetMarshaler,
    StringMarshaler, StringSetMarshaler,
};
use crate::wire::{self, WireItem};

/// Validation hook consulted before an item is saved.
pub trait Validator: Send + Sync {
    fn is_valid(&self, item: &Item) -> bool;

    /// Human-readable description of what is wrong with the item
    fn error_summary(&self, item: &Item) -> String;
}

/// Validator used when a model declares none; every item is valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl Validator for NoValidation {
    fn is_valid(&self, _item: &Item) -> bool {
        true
    }

    fn error_summary(&self, _item: &Item) -> String {
        String::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyRole {
    Hash,
    Range,
}

/// Attribute declaration, consumed by [`ModelBuilder::attribute`].
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    storage_name: Option<String>,
    marshaler: Arc<dyn Marshaler>,
    key: Option<KeyRole>,
    default_value: Option<Value>,
    persist_nil: bool,
}

impl Attribute {
    /// Declare an attribute with a custom marshaler
    pub fn new(name: impl Into<String>, marshaler: Arc<dyn Marshaler>) -> Self {
        Self {
            name: name.into(),
            storage_name: None,
            marshaler,
            key: None,
            default_value: None,
            persist_nil: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(StringMarshaler))
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(IntegerMarshaler))
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(FloatMarshaler))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(BooleanMarshaler))
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(DateTimeMarshaler))
    }

    pub fn epoch_time(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(EpochTimeMarshaler))
    }

    pub fn map(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(MapMarshaler))
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(ListMarshaler))
    }

    pub fn string_set(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(StringSetMarshaler))
    }

    pub fn number_set(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(NumberSetMarshaler))
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(BinaryMarshaler))
    }

    /// Name of the attribute in stored items (defaults to the field name)
    #[must_use]
    pub fn storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    #[must_use]
    pub fn hash_key(mut self) -> Self {
        self.key = Some(KeyRole::Hash);
        self
    }

    #[must_use]
    pub fn range_key(mut self) -> Self {
        self.key = Some(KeyRole::Range);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Write nil values as explicit nulls instead of removing the attribute
    #[must_use]
    pub fn persist_nil(mut self) -> Self {
        self.persist_nil = true;
        self
    }
}

/// One declared field of a model.
#[derive(Debug, Clone)]
pub struct AttributeDef {
    name: String,
    storage_name: String,
    marshaler: Arc<dyn Marshaler>,
    default_value: Option<Value>,
    persist_nil: bool,
}

impl AttributeDef {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    #[must_use]
    pub fn persists_nil(&self) -> bool {
        self.persist_nil
    }

    pub fn type_cast(&self, value: Value) -> Result<Value> {
        self.marshaler
            .type_cast(value)
            .map_err(|e| Error::marshal(&self.name, e.0))
    }

    /// Serialize a native value; `None` means the attribute is not written
    /// (and is removed by updates).
    pub fn serialize(&self, value: &Value) -> Result<Option<JsonValue>> {
        if value.is_null() {
            return Ok(self.persist_nil.then(wire::null));
        }
        self.marshaler
            .serialize(value)
            .map_err(|e| Error::marshal(&self.name, e.0))
    }

    pub fn extract(&self, attr: &JsonValue) -> Result<Value> {
        if wire::is_null(attr) {
            return Ok(Value::Null);
        }
        self.marshaler
            .extract(attr)
            .map_err(|e| Error::marshal(&self.name, e.0))
    }
}

/// Immutable description of a model.
pub struct ModelDescriptor {
    table_name: String,
    attributes: Vec<AttributeDef>,
    hash_key: usize,
    range_key: Option<usize>,
    track_mutations: bool,
    validator: Arc<dyn Validator>,
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("table_name", &self.table_name)
            .field("attributes", &self.attributes)
            .field("hash_key", &self.hash_key().name())
            .field("range_key", &self.range_key().map(AttributeDef::name))
            .field("track_mutations", &self.track_mutations)
            .finish_non_exhaustive()
    }
}

impl ModelDescriptor {
    pub fn builder(table_name: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(table_name)
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Declared attributes in declaration order
    #[must_use]
    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Like [`attribute`](Self::attribute) but fails with `UnknownAttribute`
    pub fn attribute_for(&self, name: &str) -> Result<&AttributeDef> {
        self.attribute(name)
            .ok_or_else(|| Error::UnknownAttribute(name.to_string()))
    }

    pub fn storage_name_for(&self, name: &str) -> Result<&str> {
        self.attribute_for(name).map(AttributeDef::storage_name)
    }

    #[must_use]
    pub fn attribute_by_storage_name(&self, storage_name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.storage_name == storage_name)
    }

    #[must_use]
    pub fn hash_key(&self) -> &AttributeDef {
        &self.attributes[self.hash_key]
    }

    #[must_use]
    pub fn range_key(&self) -> Option<&AttributeDef> {
        self.range_key.map(|i| &self.attributes[i])
    }

    /// Key attributes, hash key first
    pub fn key_attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        std::iter::once(self.hash_key()).chain(self.range_key())
    }

    #[must_use]
    pub fn is_key(&self, name: &str) -> bool {
        self.key_attributes().any(|a| a.name == name)
    }

    #[must_use]
    pub fn tracks_mutations(&self) -> bool {
        self.track_mutations
    }

    #[must_use]
    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    /// Extract every declared attribute present in a stored item.
    /// Attributes the model does not declare are ignored.
    pub fn extract(&self, item: &WireItem) -> Result<Vec<(String, Value)>> {
        self.attributes
            .iter()
            .filter_map(|def| {
                item.get(&def.storage_name)
                    .map(|attr| def.extract(attr).map(|v| (def.name.clone(), v)))
            })
            .collect()
    }
}

/// Builder for [`ModelDescriptor`]; `build` enforces the key declaration rules.
pub struct ModelBuilder {
    table_name: String,
    attributes: Vec<Attribute>,
    track_mutations: bool,
    validator: Arc<dyn Validator>,
}

impl ModelBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            attributes: Vec::new(),
            track_mutations: true,
            validator: Arc::new(NoValidation),
        }
    }

    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// With mutation tracking off, only assignments through the setter
    /// can make an attribute dirty.
    #[must_use]
    pub fn track_mutations(mut self, enabled: bool) -> Self {
        self.track_mutations = enabled;
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn build(self) -> Result<Arc<ModelDescriptor>> {
        if self.table_name.is_empty() {
            return Err(Error::InvalidModel("table name must not be empty".into()));
        }

        let mut names = HashSet::new();
        let mut storage_names = HashSet::new();
        let mut hash_key = None;
        let mut range_key = None;
        let mut attributes = Vec::with_capacity(self.attributes.len());

        for (index, attr) in self.attributes.into_iter().enumerate() {
            let storage_name = attr.storage_name.unwrap_or_else(|| attr.name.clone());
            if !names.insert(attr.name.clone()) {
                return Err(Error::InvalidModel(format!(
                    "attribute {} is declared twice",
                    attr.name
                )));
            }
            if !storage_names.insert(storage_name.clone()) {
                return Err(Error::InvalidModel(format!(
                    "storage name {} is used by more than one attribute",
                    storage_name
                )));
            }

            match attr.key {
                Some(KeyRole::Hash) if hash_key.is_some() => {
                    return Err(Error::InvalidModel("more than one hash key declared".into()));
                }
                Some(KeyRole::Range) if range_key.is_some() => {
                    return Err(Error::InvalidModel("more than one range key declared".into()));
                }
                Some(KeyRole::Hash) => hash_key = Some(index),
                Some(KeyRole::Range) => range_key = Some(index),
                None => {}
            }

            let mut def = AttributeDef {
                name: attr.name,
                storage_name,
                marshaler: attr.marshaler,
                default_value: None,
                persist_nil: attr.persist_nil,
            };
            if let Some(default) = attr.default_value {
                def.default_value = Some(def.type_cast(default)?);
            }
            attributes.push(def);
        }

        let hash_key = hash_key.ok_or_else(|| {
            Error::InvalidModel(format!("model for {} has no hash key", self.table_name))
        })?;

        Ok(Arc::new(ModelDescriptor {
            table_name: self.table_name,
            attributes,
            hash_key,
            range_key,
            track_mutations: self.track_mutations,
            validator: self.validator,
        }))
    }
}
