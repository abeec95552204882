//! The mapper: entry point for every store operation
//!
//! Item persistence lives in [`crate::persistence`], transactional requests
//! in [`crate::transaction`]; both are `impl` blocks on [`Mapper`].

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use dynamap_common::{Config, Result, TransportError};

use crate::client::{NetworkClient, Operation};
use crate::item::Item;
use crate::key::{self, KeyTuple};
use crate::model::ModelDescriptor;

/// Issues store requests for items through a [`NetworkClient`].
#[derive(Debug)]
pub struct Mapper<C> {
    client: C,
    config: Config,
}

impl<C: NetworkClient> Mapper<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, Config::default())
    }

    pub fn with_config(client: C, config: Config) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Physical table name of a model, configured prefix applied
    #[must_use]
    pub fn table_name(&self, model: &ModelDescriptor) -> String {
        self.config.table_name(model.table_name())
    }

    /// Resolve the full key of an item
    pub fn key_values(&self, item: &Item) -> Result<KeyTuple> {
        key::key_values(item)
    }

    pub(crate) fn dispatch(
        &self,
        operation: Operation,
        params: Map<String, JsonValue>,
    ) -> std::result::Result<JsonValue, TransportError> {
        debug!(
            operation = %operation,
            table = params.get("TableName").and_then(JsonValue::as_str).unwrap_or("-"),
            "Dispatching request"
        );
        self.client.execute(operation, JsonValue::Object(params))
    }
}
