//! An asynchronous Debug Adapter Protocol session engine.
//!
//! A [`Session`] owns one bidirectional byte stream. It decodes
//! `Content-Length` framed messages, runs inbound requests against a
//! [`Backend`] concurrently, answers each exactly once and correlates the
//! peer's answers to requests sent through a [`Client`].
pub mod backend;
pub mod client;
pub mod codec;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod log;
pub mod protocol;
pub mod sequence;
pub mod server;
pub mod session;
pub mod translate;
pub mod writer;

pub use backend::{Backend, StepInTarget, StepInTargetsResponse};
pub use client::{Client, RunInTerminalArguments, RunInTerminalKind, RunInTerminalResponse, SessionState};
pub use correlation::PendingResponse;
pub use dap;
pub use error::{ErrorMessage, HandlerError, HandlerResult, ReverseRequestError, SessionError};
pub use server::{serve_stdio, serve_tcp};
pub use session::Session;
