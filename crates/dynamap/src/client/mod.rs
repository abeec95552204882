//! Network client contract
//!
//! The mapper never talks to the store directly. Every request goes through
//! a [`NetworkClient`]: an operation name plus DynamoDB JSON request
//! parameters in, a DynamoDB JSON response or a classified
//! [`TransportError`] out.

pub mod blocking;

use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

use dynamap_common::TransportError;

/// Store operations issued by the mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PutItem,
    UpdateItem,
    DeleteItem,
    GetItem,
    TransactWriteItems,
    TransactGetItems,
}

impl Operation {
    /// Wire name of the operation (the `X-Amz-Target` action)
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::PutItem => "PutItem",
            Operation::UpdateItem => "UpdateItem",
            Operation::DeleteItem => "DeleteItem",
            Operation::GetItem => "GetItem",
            Operation::TransactWriteItems => "TransactWriteItems",
            Operation::TransactGetItems => "TransactGetItems",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous request/response client for the backing store.
///
/// Implementations map service faults to [`TransportError`] by error code
/// (see [`TransportError::from_code`], or [`TransportError::from_error_body`]
/// to keep a cancelled transaction's per-intent reasons) so the mapper can
/// tell a failed condition check apart from other failures.
pub trait NetworkClient {
    fn execute(&self, operation: Operation, params: JsonValue) -> Result<JsonValue, TransportError>;
}

impl<C: NetworkClient + ?Sized> NetworkClient for &C {
    fn execute(&self, operation: Operation, params: JsonValue) -> Result<JsonValue, TransportError> {
        (**self).execute(operation, params)
    }
}

impl<C: NetworkClient + ?Sized> NetworkClient for Arc<C> {
    fn execute(&self, operation: Operation, params: JsonValue) -> Result<JsonValue, TransportError> {
        (**self).execute(operation, params)
    }
}

impl<C: NetworkClient + ?Sized> NetworkClient for Box<C> {
    fn execute(&self, operation: Operation, params: JsonValue) -> Result<JsonValue, TransportError> {
        (**self).execute(operation, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl NetworkClient for Echo {
        fn execute(&self, operation: Operation, params: JsonValue) -> Result<JsonValue, TransportError> {
            Ok(json!({ "op": operation.as_str(), "params": params }))
        }
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::PutItem.to_string(), "PutItem");
        assert_eq!(Operation::TransactGetItems.as_str(), "TransactGetItems");
    }

    #[test]
    fn test_forwarding_impls() {
        let shared: Arc<dyn NetworkClient> = Arc::new(Echo);
        let boxed: Box<dyn NetworkClient> = Box::new(Echo);

        let response = shared.execute(Operation::GetItem, json!({})).unwrap();
        assert_eq!(response["op"], "GetItem");
        let response = (&boxed).execute(Operation::DeleteItem, json!({"k": 1})).unwrap();
        assert_eq!(response["params"]["k"], 1);
    }
}
