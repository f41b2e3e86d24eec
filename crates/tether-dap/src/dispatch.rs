use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::debug;

use crate::backend::Backend;
use crate::error::{ErrorMessage, HandlerError, HandlerResult};
use crate::protocol::Request;
use crate::translate::Reply;
use crate::writer::MessageWriter;

pub type HandlerFuture = BoxFuture<'static, HandlerResult<Option<Value>>>;

/// Uniform shape of every command handler: raw `arguments` in, raw `body` out.
pub type HandlerFn<B> = fn(Arc<B>, Option<Value>) -> HandlerFuture;

/// Decodes `arguments` into the shape a backend method expects. A missing
/// `arguments` field decodes as an empty object.
fn parse_arguments<A: DeserializeOwned>(arguments: Option<Value>) -> HandlerResult<A> {
    serde_json::from_value(arguments.unwrap_or_else(|| Value::Object(Default::default())))
        .map_err(HandlerError::InvalidArguments)
}

/// `()` results serialize to `null` and are sent without a body.
fn encode_body<T: Serialize>(body: T) -> HandlerResult<Option<Value>> {
    match serde_json::to_value(body).map_err(HandlerError::internal)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

macro_rules! command_table {
    (@invoke $backend:ident, $arguments:ident, $method:ident) => {{
        let _ = $arguments;
        $backend.$method().await
    }};
    (@invoke $backend:ident, $arguments:ident, $method:ident, $args:ty) => {
        $backend.$method(parse_arguments::<$args>($arguments)?).await
    };
    ($($name:literal => $method:ident $(($args:ty))?),* $(,)?) => {
        fn build_table<B: Backend>() -> HashMap<&'static str, HandlerFn<B>> {
            let mut table: HashMap<&'static str, HandlerFn<B>> = HashMap::new();
            $(
                table.insert($name, |backend, arguments| {
                    Box::pin(async move {
                        let body = command_table!(@invoke backend, arguments, $method $(, $args)?)?;
                        encode_body(body)
                    }) as HandlerFuture
                });
            )*
            table
        }
    };
}

command_table! {
    "cancel" => cancel(dap::requests::CancelArguments),
    "initialize" => initialize(dap::requests::InitializeArguments),
    "configurationDone" => configuration_done,
    "launch" => launch(dap::requests::LaunchRequestArguments),
    "attach" => attach(dap::requests::AttachRequestArguments),
    "restart" => restart(dap::requests::RestartArguments),
    "disconnect" => disconnect(dap::requests::DisconnectArguments),
    "terminate" => terminate(dap::requests::TerminateArguments),
    "breakpointLocations" => breakpoint_locations(dap::requests::BreakpointLocationsArguments),
    "setBreakpoints" => set_breakpoints(dap::requests::SetBreakpointsArguments),
    "setFunctionBreakpoints" => set_function_breakpoints(dap::requests::SetFunctionBreakpointsArguments),
    "setExceptionBreakpoints" => set_exception_breakpoints(dap::requests::SetExceptionBreakpointsArguments),
    "dataBreakpointInfo" => data_breakpoint_info(dap::requests::DataBreakpointInfoArguments),
    "setDataBreakpoints" => set_data_breakpoints(dap::requests::SetDataBreakpointsArguments),
    "continue" => continue_(dap::requests::ContinueArguments),
    "next" => next(dap::requests::NextArguments),
    "stepIn" => step_in(dap::requests::StepInArguments),
    "stepOut" => step_out(dap::requests::StepOutArguments),
    "stepBack" => step_back(dap::requests::StepBackArguments),
    "reverseContinue" => reverse_continue(dap::requests::ReverseContinueArguments),
    "restartFrame" => restart_frame(dap::requests::RestartFrameArguments),
    "goto" => goto(dap::requests::GotoArguments),
    "pause" => pause(dap::requests::PauseArguments),
    "stackTrace" => stack_trace(dap::requests::StackTraceArguments),
    "scopes" => scopes(dap::requests::ScopesArguments),
    "variables" => variables(dap::requests::VariablesArguments),
    "setVariable" => set_variable(dap::requests::SetVariableArguments),
    "source" => source(dap::requests::SourceArguments),
    "threads" => threads,
    "terminateThreads" => terminate_threads(dap::requests::TerminateThreadsArguments),
    "modules" => modules(dap::requests::ModulesArguments),
    "loadedSources" => loaded_sources,
    "evaluate" => evaluate(dap::requests::EvaluateArguments),
    "setExpression" => set_expression(dap::requests::SetExpressionArguments),
    "stepInTargets" => step_in_targets(dap::requests::StepInTargetsArguments),
    "gotoTargets" => goto_targets(dap::requests::GotoTargetsArguments),
    "completions" => completions(dap::requests::CompletionsArguments),
    "exceptionInfo" => exception_info(dap::requests::ExceptionInfoArguments),
    "readMemory" => read_memory(dap::requests::ReadMemoryArguments),
    "disassemble" => disassemble(dap::requests::DisassembleArguments),
}

/// Maps command names to backend operations.
pub struct CommandTable<B> {
    handlers: HashMap<&'static str, HandlerFn<B>>,
}

impl<B: Backend> Default for CommandTable<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> CommandTable<B> {
    pub fn new() -> Self {
        Self {
            handlers: build_table(),
        }
    }

    pub fn get(&self, command: &str) -> Option<HandlerFn<B>> {
        self.handlers.get(command).copied()
    }

    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Registered command names in sorted order.
    pub fn commands(&self) -> Vec<&'static str> {
        let mut commands = self.handlers.keys().copied().collect::<Vec<_>>();
        commands.sort_unstable();
        commands
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runs inbound requests against the backend and answers each exactly once.
pub struct Dispatcher<B> {
    backend: Arc<B>,
    commands: CommandTable<B>,
    writer: Arc<MessageWriter>,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(backend: Arc<B>, writer: Arc<MessageWriter>) -> Self {
        Self {
            backend,
            commands: CommandTable::new(),
            writer,
        }
    }

    pub fn commands(&self) -> &CommandTable<B> {
        &self.commands
    }

    /// Starts `request` and returns without waiting for the backend.
    ///
    /// The handler runs on its own task; the response is written whenever it
    /// finishes, independent of other requests still in flight. Unknown
    /// commands are answered before this returns and yield `None`.
    pub async fn handle_request(&self, request: Request) -> Option<InFlightRequest> {
        let Request { seq, command, arguments } = request;

        let Some(handler) = self.commands.get(&command) else {
            debug!(seq, command = %command, "Unrecognized command");
            let reply = Reply::error(ErrorMessage::unrecognized_command(&command));
            if let Err(e) = self.writer.write_response(seq, &command, reply).await {
                debug!(seq, error = %e, "Failed to write response");
            }
            return None;
        };

        debug!(seq, command = %command, "Dispatching request");
        let task = tokio::spawn(handler(Arc::clone(&self.backend), arguments));
        let abort = task.abort_handle();
        let writer = Arc::clone(&self.writer);

        let response = tokio::spawn(async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(HandlerError::Cancelled),
                Err(e) => Err(HandlerError::internal(panic_message(e.into_panic()))),
            };

            let reply = Reply::from_outcome(&command, seq, outcome);
            if let Err(e) = writer.write_response(seq, &command, reply).await {
                debug!(seq, command = %command, error = %e, "Failed to write response");
            }
        });

        Some(InFlightRequest {
            seq,
            handler: abort,
            response,
        })
    }
}

/// A request whose handler is still running.
///
/// Awaiting it waits until the response has been written. Aborting it stops
/// the handler; the peer then receives a `cancelled` response.
#[derive(Debug)]
pub struct InFlightRequest {
    seq: i64,
    handler: AbortHandle,
    response: JoinHandle<()>,
}

impl InFlightRequest {
    /// `seq` of the request being handled.
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn abort(&self) {
        self.handler.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.response.is_finished()
    }
}

impl Future for InFlightRequest {
    type Output = Result<(), JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.response).poll(cx)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
