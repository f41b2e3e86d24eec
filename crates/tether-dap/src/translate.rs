use serde_json::{Value, json};
use tracing::{debug, error};

use crate::error::{ErrorMessage, HandlerError, HandlerResult};

/// Response fields that follow from a handler outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub success: bool,
    pub message: Option<String>,
    pub body: Option<Value>,
}

impl Reply {
    pub fn success(body: Option<Value>) -> Self {
        Self {
            success: true,
            message: None,
            body,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            success: false,
            message: Some("cancelled".to_string()),
            body: None,
        }
    }

    /// A failed reply whose message is the rendered error and whose body
    /// carries the structured detail under `error`.
    pub fn error(message: ErrorMessage) -> Self {
        Self {
            success: false,
            message: Some(message.render()),
            body: Some(json!({ "error": message })),
        }
    }

    /// Maps a handler outcome onto the protocol's error vocabulary.
    ///
    /// Internal failures are logged in full here; only their text reaches the
    /// peer.
    pub fn from_outcome(command: &str, request_seq: i64, outcome: HandlerResult<Option<Value>>) -> Self {
        match outcome {
            Ok(body) => Reply::success(body),
            Err(HandlerError::Cancelled) => {
                debug!(command, request_seq, "Request cancelled");
                Reply::cancelled()
            }
            Err(HandlerError::Domain(message)) => Reply::error(message),
            Err(HandlerError::NotSupported(name)) => {
                debug!(command, request_seq, "Command not supported by backend");
                Reply::error(ErrorMessage::not_supported(name))
            }
            Err(e) => {
                error!(command, request_seq, error = ?e, "Request failed");
                Reply::error(ErrorMessage::internal(&e.to_string()))
            }
        }
    }
}
