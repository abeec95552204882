//! Item persistence: save, find, update, delete and reload
//!
//! A save decides between three request shapes:
//! - forced saves are unconditional puts of the full attribute set,
//! - new items (or items whose key changed) are puts guarded against
//!   overwriting an existing record,
//! - persisted items send only their dirty non-key attributes as an update.
//!
//! In-memory state changes only after the store confirmed the write.

use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, instrument};

use dynamap_common::{Error, Result, Value};

use crate::client::{NetworkClient, Operation};
use crate::expression::{build_update_expression, prevent_overwrite_expression, write_placeholders};
use crate::item::Item;
use crate::key::{key_from_pairs, key_values};
use crate::mapper::Mapper;
use crate::model::ModelDescriptor;

/// Raw request parameters passed through to the store unchanged
/// (e.g. `ReturnConsumedCapacity`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    params: Map<String, JsonValue>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Copy the passthrough parameters into a request. A parameter the
    /// mapper already generated cannot be overridden.
    pub(crate) fn apply_to(&self, params: &mut Map<String, JsonValue>) -> Result<()> {
        if let Some(name) = self.params.keys().find(|name| params.contains_key(*name)) {
            return Err(Error::InvalidArgument(format!(
                "Request option {} conflicts with a generated parameter",
                name
            )));
        }
        params.extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Skip the overwrite guard and put the full item unconditionally
    pub force: bool,
    pub request: RequestOptions,
}

impl SaveOptions {
    #[must_use]
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }
}

/// Lookup of a single item by key
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    key: Vec<(String, Value)>,
    consistent_read: bool,
    request: RequestOptions,
}

impl FindOptions {
    pub fn new<K: Into<String>>(key: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            key: key.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn consistent_read(mut self, enabled: bool) -> Self {
        self.consistent_read = enabled;
        self
    }

    #[must_use]
    pub fn with_request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }
}

pub(crate) fn table_param(params: &mut Map<String, JsonValue>, table: String) {
    params.insert("TableName".into(), JsonValue::String(table));
}

fn conditional_write(source: dynamap_common::TransportError) -> Error {
    if source.is_conditional_check_failed() {
        Error::ConditionalWriteFailed { source }
    } else {
        Error::Transport(source)
    }
}

impl<C: NetworkClient> Mapper<C> {
    /// Save an item. Returns `Ok(false)` without any request when the
    /// model's validator rejects the item.
    #[instrument(skip(self, item, options), fields(table = %item.model().table_name()))]
    pub fn save(&self, item: &mut Item, options: &SaveOptions) -> Result<bool> {
        if !item.model().validator().is_valid(item) {
            debug!("Item failed validation, not saved");
            return Ok(false);
        }
        self.persist(item, options)?;
        Ok(true)
    }

    /// Save an item, failing with `ValidationError` when it is invalid
    #[instrument(skip(self, item, options), fields(table = %item.model().table_name()))]
    pub fn save_strict(&self, item: &mut Item, options: &SaveOptions) -> Result<()> {
        let validator = item.model().validator();
        if !validator.is_valid(item) {
            return Err(Error::ValidationError(validator.error_summary(item)));
        }
        self.persist(item, options)
    }

    fn persist(&self, item: &mut Item, options: &SaveOptions) -> Result<()> {
        let key = key_values(item)?;
        let mut params = Map::new();
        table_param(&mut params, self.table_name(item.model()));

        if options.force {
            params.insert("Item".into(), JsonValue::Object(item.wire_item_for_save()?));
            options.request.apply_to(&mut params)?;
            self.dispatch(Operation::PutItem, params)?;
        } else if item.is_new_record() || item.key_dirty() {
            let guard = prevent_overwrite_expression(item.model());
            params.insert("Item".into(), JsonValue::Object(item.wire_item_for_save()?));
            params.insert("ConditionExpression".into(), guard.expression.into());
            write_placeholders(&mut params, guard.names, guard.values);
            options.request.apply_to(&mut params)?;
            self.dispatch(Operation::PutItem, params)
                .map_err(conditional_write)?;
        } else {
            let changes = item.dirty_changes_for_update();
            params.insert("Key".into(), JsonValue::Object(key.to_wire()));
            if let Some(update) = build_update_expression(item.model(), &changes)? {
                params.insert("UpdateExpression".into(), update.expression.into());
                write_placeholders(&mut params, update.names, update.values);
            }
            params.insert("ReturnValues".into(), "ALL_NEW".into());
            options.request.apply_to(&mut params)?;

            let response = self.dispatch(Operation::UpdateItem, params)?;
            if let Some(attributes) = response.get("Attributes").and_then(JsonValue::as_object) {
                // The update is committed; undecodable attributes only skip the merge
                match item.extract_returned(attributes) {
                    Ok(returned) => item.apply_extracted(returned),
                    Err(err) => debug!(error = %err, "Returned attributes not merged"),
                }
            }
            item.mark_updated();
            return Ok(());
        }

        item.mark_persisted();
        Ok(())
    }

    /// Assign attributes, then [`save`](Self::save)
    pub fn update<K: AsRef<str>>(
        &self,
        item: &mut Item,
        pairs: impl IntoIterator<Item = (K, Value)>,
        options: &SaveOptions,
    ) -> Result<bool> {
        item.assign_attributes(pairs)?;
        self.save(item, options)
    }

    /// Assign attributes, then [`save_strict`](Self::save_strict)
    pub fn update_strict<K: AsRef<str>>(
        &self,
        item: &mut Item,
        pairs: impl IntoIterator<Item = (K, Value)>,
        options: &SaveOptions,
    ) -> Result<()> {
        item.assign_attributes(pairs)?;
        self.save_strict(item, options)
    }

    /// Update a stored item without loading it first.
    ///
    /// Key attributes are taken from `pairs`; every other pair is set, or
    /// removed when its value serializes to nothing. Returns the item as
    /// stored after the update.
    #[instrument(skip(self, model, pairs, options), fields(table = %model.table_name()))]
    pub fn update_item<K: AsRef<str>>(
        &self,
        model: &Arc<ModelDescriptor>,
        pairs: &[(K, Value)],
        options: &RequestOptions,
    ) -> Result<Option<Item>> {
        let key = key_from_pairs(model, pairs)?;
        let mut changes = Vec::new();
        for (name, value) in pairs {
            let def = model.attribute_for(name.as_ref())?;
            if !model.is_key(def.name()) {
                changes.push((def.name().to_string(), def.type_cast(value.clone())?));
            }
        }

        let mut params = Map::new();
        table_param(&mut params, self.table_name(model));
        params.insert("Key".into(), JsonValue::Object(key.to_wire()));
        if let Some(update) = build_update_expression(model, &changes)? {
            params.insert("UpdateExpression".into(), update.expression.into());
            write_placeholders(&mut params, update.names, update.values);
        }
        params.insert("ReturnValues".into(), "ALL_NEW".into());
        options.apply_to(&mut params)?;

        let response = self.dispatch(Operation::UpdateItem, params)?;
        response
            .get("Attributes")
            .and_then(JsonValue::as_object)
            .map(|attributes| Item::from_wire_item(model, attributes))
            .transpose()
    }

    /// Delete an item by key and mark it destroyed
    #[instrument(skip(self, item, options), fields(table = %item.model().table_name()))]
    pub fn delete(&self, item: &mut Item, options: &RequestOptions) -> Result<()> {
        let key = key_values(item)?;
        let mut params = Map::new();
        table_param(&mut params, self.table_name(item.model()));
        params.insert("Key".into(), JsonValue::Object(key.to_wire()));
        options.apply_to(&mut params)?;

        self.dispatch(Operation::DeleteItem, params)?;
        item.mark_destroyed();
        Ok(())
    }

    /// Fetch an item by key; `None` when the store has no such item
    pub fn find<K: AsRef<str>>(
        &self,
        model: &Arc<ModelDescriptor>,
        key: &[(K, Value)],
    ) -> Result<Option<Item>> {
        let options = FindOptions::new(
            key.iter()
                .map(|(name, value)| (name.as_ref().to_string(), value.clone())),
        );
        self.find_with_opts(model, &options)
    }

    #[instrument(skip(self, model, options), fields(table = %model.table_name()))]
    pub fn find_with_opts(
        &self,
        model: &Arc<ModelDescriptor>,
        options: &FindOptions,
    ) -> Result<Option<Item>> {
        let key = key_from_pairs(model, &options.key)?;
        let mut params = Map::new();
        table_param(&mut params, self.table_name(model));
        params.insert("Key".into(), JsonValue::Object(key.to_wire()));
        if options.consistent_read {
            params.insert("ConsistentRead".into(), JsonValue::Bool(true));
        }
        options.request.apply_to(&mut params)?;

        let response = self.dispatch(Operation::GetItem, params)?;
        response
            .get("Item")
            .and_then(JsonValue::as_object)
            .map(|wire| Item::from_wire_item(model, wire))
            .transpose()
    }

    /// Re-read an item from the store, discarding unsaved changes
    #[instrument(skip(self, item), fields(table = %item.model().table_name()))]
    pub fn reload(&self, item: &mut Item) -> Result<()> {
        let key = key_values(item)?;
        let table = self.table_name(item.model());
        let mut params = Map::new();
        table_param(&mut params, table.clone());
        params.insert("Key".into(), key.clone().into());
        params.insert("ConsistentRead".into(), JsonValue::Bool(true));

        let response = self.dispatch(Operation::GetItem, params)?;
        match response.get("Item").and_then(JsonValue::as_object) {
            Some(wire) => {
                *item = Item::from_wire_item(item.model(), wire)?;
                Ok(())
            }
            None => Err(Error::NotFound(format!(
                "{} with key {}",
                table,
                JsonValue::from(key)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_options_passthrough() {
        let options = RequestOptions::new().param("ReturnConsumedCapacity", "TOTAL");
        let mut params = Map::new();
        params.insert("TableName".into(), json!("t"));

        options.apply_to(&mut params).unwrap();
        assert_eq!(params["ReturnConsumedCapacity"], "TOTAL");
        assert_eq!(params["TableName"], "t");
    }

    #[test]
    fn test_request_options_cannot_override_generated() {
        let options = RequestOptions::new().param("TableName", "other");
        let mut params = Map::new();
        params.insert("TableName".into(), json!("t"));

        let err = options.apply_to(&mut params).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(msg) if msg.contains("TableName")));
        assert_eq!(params["TableName"], "t");
    }

    #[test]
    fn test_conditional_write_mapping() {
        use dynamap_common::TransportError;

        let err = conditional_write(TransportError::from_code(
            "ConditionalCheckFailedException",
            "failed",
        ));
        assert!(matches!(err, Error::ConditionalWriteFailed { .. }));

        let err = conditional_write(TransportError::Network("reset".into()));
        assert!(matches!(err, Error::Transport(TransportError::Network(_))));
    }
}
