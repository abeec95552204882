//! Error types for dynamap
//!
//! Two layers: [`TransportError`] is whatever the network client reports,
//! [`Error`] is what every mapper operation returns.

use serde::Deserialize;
use thiserror::Error;

/// Result type alias using dynamap's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dynamap
#[derive(Error, Debug)]
pub enum Error {
    /// One or more key fields were unset when a key had to be resolved.
    /// Fields are listed hash key first.
    #[error("Missing required keys: {}", fields.join(", "))]
    KeyMissing { fields: Vec<String> },

    /// A guarded put lost against an existing remote item.
    #[error(
        "Conditional put failed: an item with this key already exists. \
         Check the write conditions, or use the force option to overwrite the remote item"
    )]
    ConditionalWriteFailed {
        #[source]
        source: TransportError,
    },

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error(
        "Transactional update carries its own update expression while one was generated \
         from the item's dirty attributes"
    )]
    UpdateExpressionCollision,

    #[error(
        "Transactional save of a new item generates a condition expression, which cannot be \
         merged with a provided condition expression"
    )]
    TransactionalSaveConditionCollision,

    #[error("Expression placeholder {0} is defined by both the caller and the generated expression")]
    PlaceholderCollision(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Invalid model definition: {0}")]
    InvalidModel(String),

    #[error("Cannot marshal attribute {attribute}: {message}")]
    Marshal { attribute: String, message: String },

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Failures reported by the network client, passed through unmodified
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub fn marshal(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Marshal {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// The transport failure behind this error, if any
    #[must_use]
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(e) | Error::ConditionalWriteFailed { source: e } => Some(e),
            _ => None,
        }
    }
}

/// Per-item reason attached to a cancelled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CancellationReason {
    /// Store error code, `None` for items that did not cause the cancellation
    #[serde(rename = "Code")]
    pub code: Option<String>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
}

/// Errors raised by the network client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("ConditionalCheckFailedException: {0}")]
    ConditionalCheckFailed(String),

    #[error("TransactionCanceledException: {message}")]
    TransactionCanceled {
        message: String,
        reasons: Vec<CancellationReason>,
    },

    #[error("ProvisionedThroughputExceededException: {0}")]
    ThroughputExceeded(String),

    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// The request never produced a service response
    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Classify a service error by its error code
    #[must_use]
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "ConditionalCheckFailedException" => TransportError::ConditionalCheckFailed(message),
            "TransactionCanceledException" => Self::transaction_canceled(message, Vec::new()),
            "ProvisionedThroughputExceededException" => TransportError::ThroughputExceeded(message),
            _ => TransportError::Service {
                code: code.to_string(),
                message,
            },
        }
    }

    /// A cancelled transaction with one reason per intent, in request order
    #[must_use]
    pub fn transaction_canceled(
        message: impl Into<String>,
        reasons: Vec<CancellationReason>,
    ) -> Self {
        TransportError::TransactionCanceled {
            message: message.into(),
            reasons,
        }
    }

    /// Classify a service error response body:
    /// `{"__type": "...#Code", "message": "...", "CancellationReasons": [...]}`
    #[must_use]
    pub fn from_error_body(body: &serde_json::Value) -> Self {
        let code = body
            .get("__type")
            .and_then(serde_json::Value::as_str)
            .map_or("UnknownError", |t| t.rsplit('#').next().unwrap_or(t));
        let message = body
            .get("message")
            .or_else(|| body.get("Message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        match body.get("CancellationReasons") {
            Some(reasons) if code == "TransactionCanceledException" => {
                let reasons = serde_json::from_value(reasons.clone()).unwrap_or_default();
                Self::transaction_canceled(message, reasons)
            }
            _ => Self::from_code(code, message),
        }
    }

    /// Per-intent reasons of a cancelled transaction, empty otherwise
    #[must_use]
    pub fn cancellation_reasons(&self) -> &[CancellationReason] {
        match self {
            TransportError::TransactionCanceled { reasons, .. } => reasons,
            _ => &[],
        }
    }

    /// Get the DynamoDB-style error code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            TransportError::ConditionalCheckFailed(_) => "ConditionalCheckFailedException",
            TransportError::TransactionCanceled { .. } => "TransactionCanceledException",
            TransportError::ThroughputExceeded(_) => "ProvisionedThroughputExceededException",
            TransportError::Service { code, .. } => code,
            TransportError::Network(_) => "NetworkError",
        }
    }

    #[must_use]
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, TransportError::ConditionalCheckFailed(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}
