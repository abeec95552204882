//! Item instances
//!
//! An [`Item`] is the in-memory copy of one stored record: current attribute
//! values, the dirty tracker's clean snapshot and the lifecycle flags.
//! Every attribute access goes through the model descriptor, so unknown
//! attribute names are rejected instead of silently stored.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dynamap_common::{Error, Result, Value};

use crate::dirty::DirtyTracker;
use crate::model::ModelDescriptor;
use crate::wire::WireItem;

/// One in-memory record of a model.
#[derive(Clone)]
pub struct Item {
    model: Arc<ModelDescriptor>,
    data: HashMap<String, Value>,
    tracker: DirtyTracker,
    new_record: bool,
    destroyed: bool,
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("table_name", &self.model.table_name())
            .field("data", &self.data)
            .field("new_record", &self.new_record)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Item {
    /// Create a new, never persisted item
    #[must_use]
    pub fn new(model: &Arc<ModelDescriptor>) -> Self {
        Self {
            model: Arc::clone(model),
            data: HashMap::new(),
            tracker: DirtyTracker::new(model.tracks_mutations()),
            new_record: true,
            destroyed: false,
        }
    }

    /// Create a new item and assign the given attributes
    pub fn from_pairs<K: AsRef<str>>(
        model: &Arc<ModelDescriptor>,
        pairs: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<Self> {
        let mut item = Self::new(model);
        item.assign_attributes(pairs)?;
        Ok(item)
    }

    /// Build a persisted, clean item from a stored record
    pub fn from_wire_item(model: &Arc<ModelDescriptor>, wire: &WireItem) -> Result<Self> {
        let mut item = Self::new(model);
        for (name, value) in model.extract(wire)? {
            item.data.insert(name, value);
        }
        item.mark_persisted();
        Ok(item)
    }

    #[must_use]
    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    /// Current value of an attribute; `None` when unset or undeclared
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Mutable access to a set attribute for in-place changes.
    ///
    /// Such changes are only seen by models that track mutations.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.data.get_mut(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = self.model.attribute_for(name)?.type_cast(value.into())?;
        self.data.insert(name.to_string(), value);
        self.tracker.record_assignment(name);
        Ok(())
    }

    /// Assign several attributes at once. Every name is resolved and every
    /// value cast before anything is assigned.
    pub fn assign_attributes<K: AsRef<str>>(
        &mut self,
        pairs: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<()> {
        let mut cast = Vec::new();
        for (name, value) in pairs {
            let def = self.model.attribute_for(name.as_ref())?;
            cast.push((def.name().to_string(), def.type_cast(value)?));
        }
        for (name, value) in cast {
            self.tracker.record_assignment(&name);
            self.data.insert(name, value);
        }
        Ok(())
    }

    /// Current values of all set attributes
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.data.clone()
    }

    // ===== Lifecycle =====

    #[must_use]
    pub fn is_new_record(&self) -> bool {
        self.new_record
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !(self.new_record || self.destroyed)
    }

    /// After a load or a put: the stored item carries the defaults
    pub(crate) fn mark_persisted(&mut self) {
        self.new_record = false;
        self.destroyed = false;
        self.clean();
    }

    /// After an update: only the sent changes reached the store, so
    /// defaults stay unmaterialized
    pub(crate) fn mark_updated(&mut self) {
        self.new_record = false;
        self.destroyed = false;
        self.tracker.clean(&self.data);
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.new_record = false;
        self.destroyed = true;
    }

    // ===== Dirty tracking =====

    /// Names of dirty attributes in declaration order
    #[must_use]
    pub fn dirty(&self) -> Vec<String> {
        self.model
            .attributes()
            .iter()
            .filter(|def| self.tracker.attribute_dirty(def.name(), self.data.get(def.name())))
            .map(|def| def.name().to_string())
            .collect()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.model
            .attributes()
            .iter()
            .any(|def| self.tracker.attribute_dirty(def.name(), self.data.get(def.name())))
    }

    pub fn attribute_dirty(&self, name: &str) -> Result<bool> {
        self.model.attribute_for(name)?;
        Ok(self.tracker.attribute_dirty(name, self.data.get(name)))
    }

    /// Value of an attribute as of the last load or save
    pub fn attribute_was(&self, name: &str) -> Result<Option<&Value>> {
        self.model.attribute_for(name)?;
        Ok(self.tracker.was(name))
    }

    /// Dirty attributes with their current values (nil when unset)
    #[must_use]
    pub fn dirty_changes(&self) -> Vec<(String, Value)> {
        self.dirty()
            .into_iter()
            .map(|name| {
                let value = self.data.get(&name).cloned().unwrap_or_default();
                (name, value)
            })
            .collect()
    }

    /// Dirty non-key attributes, the payload of an update
    pub(crate) fn dirty_changes_for_update(&self) -> Vec<(String, Value)> {
        self.dirty_changes()
            .into_iter()
            .filter(|(name, _)| !self.model.is_key(name))
            .collect()
    }

    /// Whether any key attribute changed since the last load or save
    #[must_use]
    pub fn key_dirty(&self) -> bool {
        self.model
            .key_attributes()
            .any(|def| self.tracker.attribute_dirty(def.name(), self.data.get(def.name())))
    }

    /// Restore one attribute to its clean value
    pub fn rollback_attribute(&mut self, name: &str) -> Result<()> {
        self.model.attribute_for(name)?;
        match self.tracker.was(name) {
            Some(value) => {
                self.data.insert(name.to_string(), value.clone());
            }
            None => {
                self.data.remove(name);
            }
        }
        self.tracker.clear_assignment(name);
        Ok(())
    }

    /// Restore every dirty attribute to its clean value
    pub fn rollback(&mut self) -> Result<()> {
        for name in self.dirty() {
            self.rollback_attribute(&name)?;
        }
        Ok(())
    }

    /// Accept the current values as persisted, materializing defaults first
    pub fn clean(&mut self) {
        self.populate_default_values();
        self.tracker.clean(&self.data);
    }

    fn populate_default_values(&mut self) {
        for def in self.model.attributes() {
            if let Some(default) = def.default_value() {
                let unset = self.data.get(def.name()).map_or(true, Value::is_null);
                if unset {
                    self.data.insert(def.name().to_string(), default.clone());
                    self.tracker.record_assignment(def.name());
                }
            }
        }
    }

    // ===== Wire conversion =====

    /// Serialize current values; unset and omitted attributes are left out
    pub fn to_wire_item(&self) -> Result<WireItem> {
        self.serialize_attributes(false)
    }

    /// Serialize the full attribute set for a put, defaults included.
    /// Defaults are only materialized in memory once the write succeeds.
    pub(crate) fn wire_item_for_save(&self) -> Result<WireItem> {
        self.serialize_attributes(true)
    }

    fn serialize_attributes(&self, with_defaults: bool) -> Result<WireItem> {
        let mut item = WireItem::new();
        for def in self.model.attributes() {
            let current = self.data.get(def.name()).filter(|v| !v.is_null());
            let value = match current {
                Some(value) => Some(value),
                None if with_defaults => def.default_value(),
                None => None,
            };
            let serialized = match value {
                Some(value) => def.serialize(value)?,
                None => def.serialize(&Value::Null)?,
            };
            if let Some(attr) = serialized {
                item.insert(def.storage_name().to_string(), attr);
            }
        }
        Ok(item)
    }

    /// Decode attributes returned by the store without touching the item
    pub(crate) fn extract_returned(&self, attributes: &WireItem) -> Result<Vec<(String, Value)>> {
        self.model.extract(attributes)
    }

    /// Overwrite attributes with values that were already type-checked
    pub(crate) fn apply_extracted(&mut self, values: Vec<(String, Value)>) {
        for (name, value) in values {
            self.data.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attribute;
    use serde_json::json;

    fn model(track_mutations: bool) -> Arc<ModelDescriptor> {
        ModelDescriptor::builder("people")
            .attribute(Attribute::string("id").hash_key())
            .attribute(Attribute::string("name").storage_name("full_name"))
            .attribute(Attribute::integer("age"))
            .attribute(Attribute::list("tags"))
            .attribute(Attribute::boolean("active").default_value(true))
            .track_mutations(track_mutations)
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_item_lifecycle() {
        let item = Item::new(&model(true));
        assert!(item.is_new_record());
        assert!(!item.is_destroyed());
        assert!(!item.is_persisted());
        assert!(!item.is_dirty());
    }

    #[test]
    fn test_set_type_casts_and_rejects_unknown() {
        let mut item = Item::new(&model(true));
        item.set("age", "42").unwrap();
        assert_eq!(item.get("age"), Some(&Value::Integer(42)));

        let err = item.set("nickname", "bob").unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute(_)));
        assert!(matches!(item.set("age", "old"), Err(Error::Marshal { .. })));
    }

    #[test]
    fn test_assign_attributes_is_all_or_nothing() {
        let mut item = Item::new(&model(true));
        let err = item
            .assign_attributes([("name", Value::from("Ann")), ("bogus", Value::from(1i64))])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute(name) if name == "bogus"));
        assert_eq!(item.get("name"), None);
    }

    #[test]
    fn test_dirty_in_declaration_order() {
        let mut item = Item::new(&model(true));
        item.set("age", 30i64).unwrap();
        item.set("id", "p1").unwrap();
        assert_eq!(item.dirty(), vec!["id".to_string(), "age".to_string()]);

        item.clean();
        assert!(!item.is_dirty());
        item.set("age", 30i64).unwrap();
        assert!(!item.is_dirty());
    }

    #[test]
    fn test_clean_materializes_defaults() {
        let mut item = Item::new(&model(true));
        assert_eq!(item.get("active"), None);
        item.clean();
        assert_eq!(item.get("active"), Some(&Value::Bool(true)));
        assert!(!item.attribute_dirty("active").unwrap());
    }

    #[test]
    fn test_in_place_mutation_tracking() {
        let mut tracked = Item::from_pairs(&model(true), [("tags", Value::from(vec!["a"]))]).unwrap();
        tracked.clean();
        if let Some(Value::List(tags)) = tracked.get_mut("tags") {
            tags.push(Value::from("b"));
        }
        assert_eq!(tracked.dirty(), vec!["tags".to_string()]);

        let mut untracked =
            Item::from_pairs(&model(false), [("tags", Value::from(vec!["a"]))]).unwrap();
        untracked.clean();
        if let Some(Value::List(tags)) = untracked.get_mut("tags") {
            tags.push(Value::from("b"));
        }
        assert!(!untracked.is_dirty());
    }

    #[test]
    fn test_rollback() {
        let mut item = Item::from_pairs(&model(true), [("name", Value::from("Ann"))]).unwrap();
        item.clean();
        item.set("name", "Bea").unwrap();
        item.set("age", 5i64).unwrap();
        assert_eq!(item.attribute_was("name").unwrap(), Some(&Value::from("Ann")));

        item.rollback_attribute("age").unwrap();
        assert_eq!(item.get("age"), None);
        item.rollback().unwrap();
        assert_eq!(item.get("name"), Some(&Value::from("Ann")));
        assert!(!item.is_dirty());
    }

    #[test]
    fn test_wire_roundtrip() {
        let model = model(true);
        let mut item = Item::from_pairs(
            &model,
            [
                ("id", Value::from("p1")),
                ("name", Value::from("Ann")),
                ("age", Value::from(41i64)),
                ("tags", Value::from(vec!["x", "y"])),
                ("active", Value::from(false)),
            ],
        )
        .unwrap();
        item.clean();

        let wire = item.to_wire_item().unwrap();
        assert_eq!(wire.get("full_name"), Some(&json!({"S": "Ann"})));

        let loaded = Item::from_wire_item(&model, &wire).unwrap();
        assert!(loaded.is_persisted());
        assert!(!loaded.is_dirty());
        for def in model.attributes() {
            assert_eq!(loaded.get(def.name()), item.get(def.name()), "{}", def.name());
        }
    }

    #[test]
    fn test_save_payload_includes_defaults_without_mutating() {
        let item = Item::from_pairs(&model(true), [("id", Value::from("p1"))]).unwrap();
        let wire = item.wire_item_for_save().unwrap();
        assert_eq!(wire.get("active"), Some(&json!({"BOOL": true})));
        assert_eq!(item.get("active"), None);
    }
}
