//! Shared fixtures: a recording client and test models

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Once};

use dynamap::{Attribute, ModelDescriptor, NetworkClient, Operation, TransportError};
use serde_json::{json, Value as JsonValue};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test log subscriber once; filter with `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Records every request and replies with scripted responses, `{}` once
/// the script runs out.
#[derive(Default)]
pub struct RecordingClient {
    calls: RefCell<Vec<(Operation, JsonValue)>>,
    responses: RefCell<VecDeque<Result<JsonValue, TransportError>>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: JsonValue) {
        self.responses.borrow_mut().push_back(Ok(response));
    }

    pub fn fail(&self, error: TransportError) {
        self.responses.borrow_mut().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<(Operation, JsonValue)> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// The only request issued so far
    pub fn single_call(&self) -> (Operation, JsonValue) {
        let calls = self.calls();
        assert_eq!(calls.len(), 1, "expected exactly one request: {calls:?}");
        calls.into_iter().next().unwrap()
    }
}

impl NetworkClient for RecordingClient {
    fn execute(&self, operation: Operation, params: JsonValue) -> Result<JsonValue, TransportError> {
        self.calls.borrow_mut().push((operation, params));
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }
}

/// Hash-key-only model with a default and a set attribute
pub fn accounts() -> Arc<ModelDescriptor> {
    ModelDescriptor::builder("accounts")
        .attribute(Attribute::string("id").hash_key())
        .attribute(Attribute::string("name"))
        .attribute(Attribute::integer("balance"))
        .attribute(Attribute::string_set("tags"))
        .attribute(Attribute::boolean("active").default_value(true))
        .build()
        .unwrap()
}

/// Model with a hash and a range key under custom storage names
pub fn events() -> Arc<ModelDescriptor> {
    ModelDescriptor::builder("events")
        .attribute(Attribute::string("stream").hash_key().storage_name("pk"))
        .attribute(Attribute::integer("seq").range_key().storage_name("sk"))
        .attribute(Attribute::string("body"))
        .build()
        .unwrap()
}

/// Stored form of an account
pub fn stored_account(id: &str, name: &str, balance: i64) -> serde_json::Map<String, JsonValue> {
    match json!({
        "id": {"S": id},
        "name": {"S": name},
        "balance": {"N": balance.to_string()},
        "active": {"BOOL": true}
    }) {
        JsonValue::Object(map) => map,
        _ => unreachable!(),
    }
}
