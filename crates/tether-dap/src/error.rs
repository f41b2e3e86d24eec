use std::collections::BTreeMap;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error code for unknown commands and unknown message types.
pub const UNRECOGNIZED: i64 = 1014;
/// Error code for commands the backend does not implement.
pub const NOT_SUPPORTED: i64 = 1015;
/// Error code for unexpected handler failures.
pub const INTERNAL_ERROR: i64 = 1104;

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Failures while turning bytes into messages and back.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Missing Content-Length header")]
    MissingContentLength,
    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),
    #[error("Frame of {length} bytes exceeds the {max} byte limit")]
    FrameTooLarge { length: usize, max: usize },
    #[error("Message body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Malformed JSON message: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Whether the read loop can drop the frame and keep going.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CodecError::Io(_))
    }
}

/// Failures of the session transport itself.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Session is closed")]
    Closed,
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Event does not serialize to an `event` name")]
    MalformedEvent,
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Codec(CodecError::Io(e))
    }
}

/// Outcome of a backend operation that did not succeed.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Domain(ErrorMessage),
    #[error("Command not supported: {0}")]
    NotSupported(&'static str),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[source] serde_json::Error),
    #[error("{0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn internal(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HandlerError::Internal(error.into())
    }
}

impl From<ErrorMessage> for HandlerError {
    fn from(message: ErrorMessage) -> Self {
        HandlerError::Domain(message)
    }
}

/// Failures observed by whoever awaits a reverse request.
#[derive(Error, Debug)]
pub enum ReverseRequestError {
    #[error("Request `{command}` was rejected: {message}")]
    Rejected { command: String, message: String },
    #[error("Expected a response to `{expected}` but received `{actual}`")]
    UnexpectedCommand { expected: String, actual: String },
    #[error("Response body does not match the expected shape: {0}")]
    InvalidBody(serde_json::Error),
    #[error("Session closed before a response arrived")]
    SessionClosed,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Structured error detail carried in `body.error` of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub id: i64,
    pub format: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_telemetry: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_user: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_label: Option<String>,
}

impl ErrorMessage {
    pub fn new(id: i64, format: impl Into<String>) -> Self {
        Self {
            id,
            format: format.into(),
            variables: BTreeMap::new(),
            send_telemetry: None,
            show_user: None,
            url: None,
            url_label: None,
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn show_user(mut self, show: bool) -> Self {
        self.show_user = Some(show);
        self
    }

    pub fn unrecognized_command(command: &str) -> Self {
        Self::new(UNRECOGNIZED, "Unrecognized command: {_cmd}").with_variable("_cmd", command)
    }

    pub fn unrecognized_type(message_type: &str) -> Self {
        Self::new(UNRECOGNIZED, "Unrecognized message type: {_type}").with_variable("_type", message_type)
    }

    pub fn not_supported(command: &str) -> Self {
        Self::new(NOT_SUPPORTED, "Command not supported: {_cmd}").with_variable("_cmd", command)
    }

    pub fn internal(error: &str) -> Self {
        Self::new(INTERNAL_ERROR, "Internal Error: {_err}").with_variable("_err", error)
    }

    /// Expands `{name}` placeholders in `format`, quoting each value in backticks.
    /// Unknown placeholders are left as they are.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.format.len());
        let mut rest = self.format.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match self.variables.get(name) {
                        Some(value) => {
                            out.push('`');
                            out.push_str(value);
                            out.push('`');
                        }
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
