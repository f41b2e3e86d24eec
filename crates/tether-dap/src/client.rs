use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use dap::events::{
    BreakpointEventBody, CapabilitiesEventBody, ContinuedEventBody, Event, ExitedEventBody,
    LoadedSourceEventBody, ModuleEventBody, OutputEventBody, ProcessEventBody, ProgressEndEventBody,
    ProgressStartEventBody, ProgressUpdateEventBody, StoppedEventBody, TerminatedEventBody, ThreadEventBody,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::correlation::{PendingRequests, PendingResponse};
use crate::error::SessionError;
use crate::writer::MessageWriter;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    Running = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Created,
            1 => SessionState::Running,
            _ => SessionState::Closed,
        }
    }
}

/// State shared between the read loop, request tasks and [`Client`] handles.
pub(crate) struct Outbound {
    pub(crate) writer: Arc<MessageWriter>,
    pub(crate) pending: Arc<PendingRequests>,
    state: AtomicU8,
}

impl Outbound {
    pub(crate) fn new(writer: Arc<MessageWriter>) -> Self {
        Self {
            writer,
            pending: Arc::new(PendingRequests::new()),
            state: AtomicU8::new(SessionState::Created as u8),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Stops all output and fails the requests still waiting for the peer.
    pub(crate) async fn close(&self) {
        self.set_state(SessionState::Closed);
        self.writer.close().await;
        let abandoned = self.pending.close();
        if abandoned > 0 {
            debug!(abandoned, "Failed pending reverse requests on close");
        }
    }
}

/// Handle a backend uses to talk to the peer: events and reverse requests.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Outbound>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.inner.state())
            .field("pending_requests", &self.inner.pending.len())
            .finish()
    }
}

impl Client {
    pub(crate) fn new(inner: Arc<Outbound>) -> Self {
        Self { inner }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state() == SessionState::Closed || self.inner.writer.is_closed()
    }

    /// Number of reverse requests still waiting for the peer.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Sends an event with a raw JSON body.
    pub async fn emit_event(&self, event: &str, body: Option<Value>) -> Result<(), SessionError> {
        self.inner.writer.emit_event(event, body).await.map(|_| ())
    }

    /// Sends a typed event as is.
    pub async fn send_event(&self, event: Event) -> Result<(), SessionError> {
        let mut value = serde_json::to_value(&event)?;
        let name = value
            .get("event")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(SessionError::MalformedEvent)?;
        let body = value.get_mut("body").map(Value::take).filter(|body| !body.is_null());

        self.emit_event(&name, body).await
    }

    pub async fn initialized(&self) -> Result<(), SessionError> {
        self.send_event(Event::Initialized).await
    }

    pub async fn stopped(&self, body: StoppedEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Stopped(body)).await
    }

    pub async fn continued(&self, body: ContinuedEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Continued(body)).await
    }

    pub async fn exited(&self, body: ExitedEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Exited(body)).await
    }

    pub async fn terminated(&self, body: Option<TerminatedEventBody>) -> Result<(), SessionError> {
        self.send_event(Event::Terminated(body)).await
    }

    pub async fn thread(&self, body: ThreadEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Thread(body)).await
    }

    pub async fn output(&self, body: OutputEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Output(body)).await
    }

    pub async fn breakpoint(&self, body: BreakpointEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Breakpoint(body)).await
    }

    pub async fn module(&self, body: ModuleEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Module(body)).await
    }

    pub async fn loaded_source(&self, body: LoadedSourceEventBody) -> Result<(), SessionError> {
        self.send_event(Event::LoadedSource(body)).await
    }

    pub async fn process(&self, body: ProcessEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Process(body)).await
    }

    pub async fn capabilities(&self, body: CapabilitiesEventBody) -> Result<(), SessionError> {
        self.send_event(Event::Capabilities(body)).await
    }

    pub async fn progress_start(&self, body: ProgressStartEventBody) -> Result<(), SessionError> {
        self.send_event(Event::ProgressStart(body)).await
    }

    pub async fn progress_update(&self, body: ProgressUpdateEventBody) -> Result<(), SessionError> {
        self.send_event(Event::ProgressUpdate(body)).await
    }

    pub async fn progress_end(&self, body: ProgressEndEventBody) -> Result<(), SessionError> {
        self.send_event(Event::ProgressEnd(body)).await
    }

    /// Sends a request to the peer.
    ///
    /// Returns as soon as the request is written; await the handle for the
    /// peer's answer. The engine never times the request out.
    pub async fn send_request<T, A>(&self, command: &str, arguments: A) -> Result<PendingResponse<T>, SessionError>
    where
        T: DeserializeOwned,
        A: Serialize,
    {
        let arguments = serde_json::to_value(arguments)?;
        let arguments = (!arguments.is_null()).then_some(arguments);

        let mut receiver = None;
        let pending = &self.inner.pending;
        let result = self
            .inner
            .writer
            .write_request(command, arguments, |seq| receiver = Some((seq, pending.register(seq))))
            .await;

        match (result, receiver) {
            (Ok(_), Some((seq, rx))) => {
                debug!(seq, command, "Sent reverse request");
                Ok(PendingResponse::new(seq, command, rx, pending))
            }
            (Ok(_), None) => Err(SessionError::Closed),
            (Err(e), registered) => {
                if let Some((seq, _)) = registered {
                    pending.remove(seq);
                }
                Err(e)
            }
        }
    }

    pub async fn run_in_terminal(
        &self,
        arguments: RunInTerminalArguments,
    ) -> Result<PendingResponse<RunInTerminalResponse>, SessionError> {
        self.send_request("runInTerminal", arguments).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunInTerminalKind {
    Integrated,
    External,
}

/// Arguments of the `runInTerminal` reverse request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInTerminalArguments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RunInTerminalKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub cwd: String,
    pub args: Vec<String>,
    /// `None` values unset the variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_can_be_interpreted_by_shell: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInTerminalResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_process_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameReader;
    use crate::error::ReverseRequestError;
    use crate::protocol::Response;
    use serde_json::json;
    use tokio::io::{BufReader, duplex};

    fn client() -> (Client, FrameReader<BufReader<tokio::io::DuplexStream>>) {
        let (peer, server) = duplex(8192);
        let outbound = Arc::new(Outbound::new(Arc::new(MessageWriter::new(server))));
        (Client::new(outbound), FrameReader::new(BufReader::new(peer)))
    }

    #[tokio::test]
    async fn test_initialized_event_has_no_body() {
        let (client, mut peer) = client();
        client.initialized().await.unwrap();

        assert_eq!(
            peer.read_frame().await.unwrap(),
            Some(json!({"type": "event", "seq": 1, "event": "initialized"}))
        );
    }

    #[tokio::test]
    async fn test_emit_event_with_body() {
        let (client, mut peer) = client();
        client
            .emit_event("output", Some(json!({"category": "console", "output": "hi\n"})))
            .await
            .unwrap();

        let frame = peer.read_frame().await.unwrap().unwrap();
        assert_eq!(frame["event"], "output");
        assert_eq!(frame["body"]["output"], "hi\n");
    }

    #[tokio::test]
    async fn test_terminated_event() {
        let (client, mut peer) = client();
        client.terminated(None).await.unwrap();

        let frame = peer.read_frame().await.unwrap().unwrap();
        assert_eq!(frame["type"], "event");
        assert_eq!(frame["event"], "terminated");
    }

    #[tokio::test]
    async fn test_run_in_terminal_round_trip() {
        let (client, mut peer) = client();
        let pending = client
            .run_in_terminal(RunInTerminalArguments {
                kind: Some(RunInTerminalKind::Integrated),
                cwd: "/tmp".to_string(),
                args: vec!["python3".to_string(), "main.py".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let frame = peer.read_frame().await.unwrap().unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "request",
                "seq": 1,
                "command": "runInTerminal",
                "arguments": {"kind": "integrated", "cwd": "/tmp", "args": ["python3", "main.py"]}
            })
        );
        assert_eq!(pending.seq(), 1);
        assert_eq!(client.pending_requests(), 1);

        client.inner.pending.resolve(Response {
            seq: 1,
            request_seq: 1,
            success: true,
            command: "runInTerminal".to_string(),
            message: None,
            body: Some(json!({"processId": 4242})),
        });

        assert_eq!(
            pending.await.unwrap(),
            RunInTerminalResponse {
                process_id: Some(4242),
                shell_process_id: None
            }
        );
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_send_request_after_close() {
        let (client, _peer) = client();
        client.inner.close().await;

        assert!(client.is_closed());
        assert!(matches!(
            client.send_request::<Value, _>("runInTerminal", json!({})).await,
            Err(SessionError::Closed)
        ));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_dropped_request_leaves_table() {
        let (client, mut peer) = client();
        let pending = client
            .send_request::<Value, _>("runInTerminal", json!({"cwd": "/", "args": []}))
            .await
            .unwrap();
        peer.read_frame().await.unwrap();
        assert_eq!(client.pending_requests(), 1);

        drop(pending);
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_outstanding_request() {
        let (client, _peer) = client();
        let pending = client
            .send_request::<Value, _>("runInTerminal", json!({"cwd": "/", "args": []}))
            .await
            .unwrap();

        client.inner.close().await;
        assert_eq!(client.state(), SessionState::Closed);
        assert!(matches!(pending.await, Err(ReverseRequestError::SessionClosed)));
    }
}
