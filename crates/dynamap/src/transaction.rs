//! Transactional writes and reads
//!
//! A transaction is composed from intents, each resolved to one fragment of
//! a single `TransactWriteItems` request. Items are only marked persisted
//! or destroyed after the store accepted the whole request; a failed or
//! canceled transaction leaves every item exactly as it was.

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use dynamap_common::{Error, Result, Value};

use crate::client::{NetworkClient, Operation};
use crate::expression::{
    build_update_expression, merge_placeholders, prevent_overwrite_expression, write_placeholders,
};
use crate::item::Item;
use crate::key::{key_from_pairs, key_values, KeyTuple};
use crate::mapper::Mapper;
use crate::model::ModelDescriptor;
use crate::persistence::{table_param, RequestOptions};
use crate::wire;

/// Caller-supplied expression parts merged into a generated fragment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentOptions {
    pub condition_expression: Option<String>,
    pub update_expression: Option<String>,
    pub expression_attribute_names: BTreeMap<String, String>,
    pub expression_attribute_values: BTreeMap<String, JsonValue>,
    pub return_values_on_condition_check_failure: Option<String>,
}

impl IntentOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn condition(mut self, expression: impl Into<String>) -> Self {
        self.condition_expression = Some(expression.into());
        self
    }

    #[must_use]
    pub fn update_expression(mut self, expression: impl Into<String>) -> Self {
        self.update_expression = Some(expression.into());
        self
    }

    /// Bind a name placeholder (`#name`) to a storage attribute name
    #[must_use]
    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.expression_attribute_names
            .insert(placeholder.into(), attribute.into());
        self
    }

    /// Bind a value placeholder (`:value`) to a native value
    #[must_use]
    pub fn value(mut self, placeholder: impl Into<String>, value: &Value) -> Self {
        self.expression_attribute_values
            .insert(placeholder.into(), wire::encode(value));
        self
    }

    /// `ALL_OLD` or `NONE`
    #[must_use]
    pub fn return_values_on_failure(mut self, setting: impl Into<String>) -> Self {
        self.return_values_on_condition_check_failure = Some(setting.into());
        self
    }
}

/// Condition check on an item that is not written, built by
/// [`Mapper::transact_check_expression`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionCheck {
    table_name: String,
    key: KeyTuple,
    options: IntentOptions,
}

/// One write of a transaction.
///
/// Intents borrow their items mutably for the duration of the call so the
/// outcome can be applied once the store confirms the transaction.
#[derive(Debug)]
pub enum TransactWrite<'a> {
    /// Full put of the item; caller conditions pass through
    Put {
        item: &'a mut Item,
        options: IntentOptions,
    },
    /// Update of the dirty non-key attributes
    Update {
        item: &'a mut Item,
        options: IntentOptions,
    },
    Delete {
        item: &'a mut Item,
        options: IntentOptions,
    },
    /// Guarded put for new items, update otherwise
    Save {
        item: &'a mut Item,
        options: IntentOptions,
    },
    Check(ConditionCheck),
}

impl<'a> TransactWrite<'a> {
    pub fn put(item: &'a mut Item) -> Self {
        TransactWrite::Put {
            item,
            options: IntentOptions::default(),
        }
    }

    pub fn update(item: &'a mut Item) -> Self {
        TransactWrite::Update {
            item,
            options: IntentOptions::default(),
        }
    }

    pub fn delete(item: &'a mut Item) -> Self {
        TransactWrite::Delete {
            item,
            options: IntentOptions::default(),
        }
    }

    pub fn save(item: &'a mut Item) -> Self {
        TransactWrite::Save {
            item,
            options: IntentOptions::default(),
        }
    }

    pub fn check(check: ConditionCheck) -> Self {
        TransactWrite::Check(check)
    }

    /// Replace the intent's options. A condition check keeps the options it
    /// was built with.
    #[must_use]
    pub fn with_options(mut self, new_options: IntentOptions) -> Self {
        match &mut self {
            TransactWrite::Put { options, .. }
            | TransactWrite::Update { options, .. }
            | TransactWrite::Delete { options, .. }
            | TransactWrite::Save { options, .. } => *options = new_options,
            TransactWrite::Check(_) => {}
        }
        self
    }
}

/// Typed get of a transactional read, built by [`Mapper::tfind_opts`]
#[derive(Debug, Clone)]
pub struct TransactGet {
    model: Arc<ModelDescriptor>,
    table_name: String,
    key: KeyTuple,
    request: RequestOptions,
}

impl TransactGet {
    #[must_use]
    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }
}

fn wrap(kind: &str, body: Map<String, JsonValue>) -> JsonValue {
    let mut fragment = Map::new();
    fragment.insert(kind.to_string(), JsonValue::Object(body));
    JsonValue::Object(fragment)
}

/// Merge caller options into a fragment body
fn finish_fragment(
    body: &mut Map<String, JsonValue>,
    mut names: BTreeMap<String, String>,
    mut values: BTreeMap<String, JsonValue>,
    options: &IntentOptions,
) -> Result<()> {
    merge_placeholders(
        &mut names,
        &mut values,
        &options.expression_attribute_names,
        &options.expression_attribute_values,
    )?;
    if let Some(condition) = &options.condition_expression {
        body.insert("ConditionExpression".into(), condition.clone().into());
    }
    write_placeholders(body, names, values);
    if let Some(setting) = &options.return_values_on_condition_check_failure {
        body.insert(
            "ReturnValuesOnConditionCheckFailure".into(),
            setting.clone().into(),
        );
    }
    Ok(())
}

fn reject_update_expression(options: &IntentOptions, what: &str) -> Result<()> {
    if options.update_expression.is_some() {
        return Err(Error::InvalidArgument(format!(
            "{} cannot carry an update expression",
            what
        )));
    }
    Ok(())
}

impl<C: NetworkClient> Mapper<C> {
    /// Build a condition check on the item with the given key
    pub fn transact_check_expression<K: AsRef<str>>(
        &self,
        model: &Arc<ModelDescriptor>,
        key: &[(K, Value)],
        options: IntentOptions,
    ) -> Result<ConditionCheck> {
        if options.condition_expression.is_none() {
            return Err(Error::InvalidArgument(
                "A condition check requires a condition expression".into(),
            ));
        }
        reject_update_expression(&options, "A condition check")?;
        Ok(ConditionCheck {
            table_name: self.table_name(model),
            key: key_from_pairs(model, key)?,
            options,
        })
    }

    /// Build a transactional get of the item with the given key
    pub fn tfind_opts<K: AsRef<str>>(
        &self,
        model: &Arc<ModelDescriptor>,
        key: &[(K, Value)],
        request: RequestOptions,
    ) -> Result<TransactGet> {
        Ok(TransactGet {
            model: Arc::clone(model),
            table_name: self.table_name(model),
            key: key_from_pairs(model, key)?,
            request,
        })
    }

    /// Write every intent in one atomic request and return the raw response
    #[instrument(skip(self, intents, options), fields(intents = intents.len()))]
    pub fn transact_write(
        &self,
        mut intents: Vec<TransactWrite<'_>>,
        options: &RequestOptions,
    ) -> Result<JsonValue> {
        if intents.is_empty() {
            return Err(Error::InvalidArgument(
                "A transaction needs at least one intent".into(),
            ));
        }

        let fragments = intents
            .iter()
            .map(|intent| self.compose(intent))
            .collect::<Result<Vec<_>>>()?;

        // Saves resolve to either shape; remember which one was sent
        let sent_put: Vec<bool> = fragments.iter().map(|f| f.get("Put").is_some()).collect();

        let mut params = Map::new();
        params.insert("TransactItems".into(), JsonValue::Array(fragments));
        options.apply_to(&mut params)?;

        let response = self.dispatch(Operation::TransactWriteItems, params)?;

        for (intent, put) in intents.iter_mut().zip(sent_put) {
            match intent {
                TransactWrite::Put { item, .. }
                | TransactWrite::Update { item, .. }
                | TransactWrite::Save { item, .. } => {
                    if put {
                        item.mark_persisted();
                    } else {
                        item.mark_updated();
                    }
                }
                TransactWrite::Delete { item, .. } => item.mark_destroyed(),
                TransactWrite::Check(_) => {}
            }
        }
        debug!("Transaction committed");
        Ok(response)
    }

    /// Read several items in one atomic request, in the order given
    #[instrument(skip(self, gets, options), fields(gets = gets.len()))]
    pub fn transact_find(
        &self,
        gets: &[TransactGet],
        options: &RequestOptions,
    ) -> Result<Vec<Option<Item>>> {
        if gets.is_empty() {
            return Err(Error::InvalidArgument(
                "A transactional read needs at least one get".into(),
            ));
        }

        let fragments = gets
            .iter()
            .map(|get| {
                let mut body = Map::new();
                table_param(&mut body, get.table_name.clone());
                body.insert("Key".into(), JsonValue::Object(get.key.to_wire()));
                get.request.apply_to(&mut body)?;
                Ok(wrap("Get", body))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut params = Map::new();
        params.insert("TransactItems".into(), JsonValue::Array(fragments));
        options.apply_to(&mut params)?;

        let response = self.dispatch(Operation::TransactGetItems, params)?;
        let responses = response
            .get("Responses")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        gets.iter()
            .enumerate()
            .map(|(index, get)| {
                responses
                    .get(index)
                    .and_then(|entry| entry.get("Item"))
                    .and_then(JsonValue::as_object)
                    .map(|wire| Item::from_wire_item(&get.model, wire))
                    .transpose()
            })
            .collect()
    }

    fn compose(&self, intent: &TransactWrite<'_>) -> Result<JsonValue> {
        match intent {
            TransactWrite::Put { item, options } => self.compose_put(item, options),
            TransactWrite::Update { item, options } => self.compose_update(item, options),
            TransactWrite::Delete { item, options } => {
                reject_update_expression(options, "A Delete intent")?;
                let key = key_values(item)?;
                let mut body = Map::new();
                table_param(&mut body, self.table_name(item.model()));
                body.insert("Key".into(), JsonValue::Object(key.to_wire()));
                finish_fragment(&mut body, BTreeMap::new(), BTreeMap::new(), options)?;
                Ok(wrap("Delete", body))
            }
            TransactWrite::Save { item, options } => {
                if item.is_new_record() || item.key_dirty() {
                    if options.condition_expression.is_some() {
                        return Err(Error::TransactionalSaveConditionCollision);
                    }
                    reject_update_expression(options, "A save of a new item")?;
                    key_values(item)?;
                    let guard = prevent_overwrite_expression(item.model());
                    let mut body = Map::new();
                    table_param(&mut body, self.table_name(item.model()));
                    body.insert("Item".into(), JsonValue::Object(item.wire_item_for_save()?));
                    body.insert("ConditionExpression".into(), guard.expression.into());
                    finish_fragment(&mut body, guard.names, guard.values, options)?;
                    Ok(wrap("Put", body))
                } else {
                    self.compose_update(item, options)
                }
            }
            TransactWrite::Check(check) => {
                let mut body = Map::new();
                table_param(&mut body, check.table_name.clone());
                body.insert("Key".into(), JsonValue::Object(check.key.to_wire()));
                finish_fragment(&mut body, BTreeMap::new(), BTreeMap::new(), &check.options)?;
                Ok(wrap("ConditionCheck", body))
            }
        }
    }

    fn compose_put(&self, item: &Item, options: &IntentOptions) -> Result<JsonValue> {
        reject_update_expression(options, "A Put intent")?;
        key_values(item)?;
        let mut body = Map::new();
        table_param(&mut body, self.table_name(item.model()));
        body.insert("Item".into(), JsonValue::Object(item.wire_item_for_save()?));
        finish_fragment(&mut body, BTreeMap::new(), BTreeMap::new(), options)?;
        Ok(wrap("Put", body))
    }

    fn compose_update(&self, item: &Item, options: &IntentOptions) -> Result<JsonValue> {
        let key = key_values(item)?;
        let mut body = Map::new();
        table_param(&mut body, self.table_name(item.model()));
        body.insert("Key".into(), JsonValue::Object(key.to_wire()));

        let generated = build_update_expression(item.model(), &item.dirty_changes_for_update())?;
        let (names, values) = match (generated, &options.update_expression) {
            (Some(_), Some(_)) => return Err(Error::UpdateExpressionCollision),
            (Some(update), None) => {
                body.insert("UpdateExpression".into(), update.expression.into());
                (update.names, update.values)
            }
            (None, Some(literal)) => {
                body.insert("UpdateExpression".into(), literal.clone().into());
                (BTreeMap::new(), BTreeMap::new())
            }
            (None, None) => (BTreeMap::new(), BTreeMap::new()),
        };

        finish_fragment(&mut body, names, values, options)?;
        Ok(wrap("Update", body))
    }
}
