//! Blocking bridge over an asynchronous client
//!
//! [`BlockingClient`] owns a current-thread tokio runtime and drives each
//! request of an [`AsyncNetworkClient`] to completion on it. It must not be
//! called from inside another tokio runtime.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use dynamap_common::config::ClientConfig;
use dynamap_common::{Error, Result, TransportError};

use super::{NetworkClient, Operation};

/// Asynchronous store client, e.g. an HTTP client speaking the DynamoDB API
#[async_trait]
pub trait AsyncNetworkClient: Send + Sync {
    async fn execute(
        &self,
        operation: Operation,
        params: JsonValue,
    ) -> std::result::Result<JsonValue, TransportError>;
}

/// Synchronous [`NetworkClient`] backed by an [`AsyncNetworkClient`]
pub struct BlockingClient<C> {
    inner: C,
    runtime: Runtime,
    timeout: Option<Duration>,
}

impl<C> fmt::Debug for BlockingClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<C: AsyncNetworkClient> BlockingClient<C> {
    pub fn new(inner: C) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| Error::Config(format!("Failed to start client runtime: {}", e)))?;

        Ok(Self {
            inner,
            runtime,
            timeout: None,
        })
    }

    /// Create a client whose request timeout comes from `[client]` config
    pub fn from_config(inner: C, config: &ClientConfig) -> Result<Self> {
        let client = Self::new(inner)?;
        Ok(match config.timeout_ms {
            Some(ms) => client.with_timeout(Duration::from_millis(ms)),
            None => client,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: AsyncNetworkClient> NetworkClient for BlockingClient<C> {
    fn execute(
        &self,
        operation: Operation,
        params: JsonValue,
    ) -> std::result::Result<JsonValue, TransportError> {
        let request = self.inner.execute(operation, params);
        match self.timeout {
            Some(timeout) => self.runtime.block_on(async {
                match tokio::time::timeout(timeout, request).await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(operation = %operation, ?timeout, "Request timed out");
                        Err(TransportError::Network(format!(
                            "{} timed out after {}ms",
                            operation,
                            timeout.as_millis()
                        )))
                    }
                }
            }),
            None => self.runtime.block_on(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Stub {
        delay: Duration,
    }

    #[async_trait]
    impl AsyncNetworkClient for Stub {
        async fn execute(
            &self,
            operation: Operation,
            params: JsonValue,
        ) -> std::result::Result<JsonValue, TransportError> {
            tokio::time::sleep(self.delay).await;
            if params.get("fail").is_some() {
                return Err(TransportError::from_code(
                    "ConditionalCheckFailedException",
                    "The conditional request failed",
                ));
            }
            Ok(json!({ "op": operation.as_str() }))
        }
    }

    #[tokio::test]
    async fn test_async_stub_directly() {
        let stub = Stub {
            delay: Duration::ZERO,
        };
        let response = AsyncNetworkClient::execute(&stub, Operation::GetItem, json!({}))
            .await
            .unwrap();
        assert_eq!(response["op"], "GetItem");
    }

    #[test]
    fn test_blocking_execute() {
        let client = BlockingClient::new(Stub {
            delay: Duration::from_millis(1),
        })
        .unwrap();

        let response = client.execute(Operation::PutItem, json!({})).unwrap();
        assert_eq!(response["op"], "PutItem");

        let err = client
            .execute(Operation::PutItem, json!({"fail": true}))
            .unwrap_err();
        assert!(err.is_conditional_check_failed());
    }

    #[test]
    fn test_timeout_from_config() {
        let config = ClientConfig {
            timeout_ms: Some(10),
            ..Default::default()
        };
        let client = BlockingClient::from_config(
            Stub {
                delay: Duration::from_secs(5),
            },
            &config,
        )
        .unwrap();

        let err = client.execute(Operation::GetItem, json!({})).unwrap_err();
        assert!(matches!(err, TransportError::Network(msg) if msg.contains("GetItem")));
    }
}
