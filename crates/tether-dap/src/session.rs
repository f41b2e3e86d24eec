use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, error, info};

use crate::backend::Backend;
use crate::client::{Client, Outbound, SessionState};
use crate::codec::FrameReader;
use crate::dispatch::{CommandTable, Dispatcher, InFlightRequest};
use crate::error::{ErrorMessage, SessionError};
use crate::protocol::{MessageKind, Request, Response};
use crate::translate::Reply;
use crate::writer::MessageWriter;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// One DAP conversation with one peer.
///
/// ```no_run
/// use tether_dap::{Backend, Client, Session};
///
/// struct Adapter {
///     client: Client,
/// }
///
/// impl Backend for Adapter {}
///
/// # async fn serve() -> Result<(), tether_dap::SessionError> {
/// let session = Session::new(tokio::io::stdin(), tokio::io::stdout(), |client| Adapter { client });
/// session.run().await
/// # }
/// ```
pub struct Session<B> {
    reader: FrameReader<BufReader<BoxedReader>>,
    router: Router<B>,
    backend: Arc<B>,
}

impl<B: Backend> Session<B> {
    /// Creates a session in the [`SessionState::Created`] state. `init` builds
    /// the backend from the [`Client`] it uses to reach the peer.
    pub fn new<R, W, F>(reader: R, writer: W, init: F) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
        F: FnOnce(Client) -> B,
    {
        let writer = Arc::new(MessageWriter::new(writer));
        let outbound = Arc::new(Outbound::new(Arc::clone(&writer)));
        let backend = Arc::new(init(Client::new(Arc::clone(&outbound))));

        Self {
            reader: FrameReader::new(BufReader::new(Box::new(reader) as BoxedReader)),
            router: Router {
                dispatcher: Dispatcher::new(Arc::clone(&backend), writer),
                outbound,
            },
            backend,
        }
    }

    pub fn client(&self) -> Client {
        Client::new(Arc::clone(&self.router.outbound))
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn commands(&self) -> &CommandTable<B> {
        self.router.dispatcher.commands()
    }

    pub fn state(&self) -> SessionState {
        self.router.outbound.state()
    }

    /// Reads and routes frames until the input ends or fails.
    ///
    /// Malformed frames are logged and skipped. On return the session is
    /// [`SessionState::Closed`]: later writes are rejected and reverse requests
    /// still waiting for the peer fail.
    pub async fn run(self) -> Result<(), SessionError> {
        let Session { mut reader, router, .. } = self;
        router.outbound.set_state(SessionState::Running);
        info!("Session started");

        let result = loop {
            match reader.read_frame().await {
                Ok(Some(message)) => {
                    router.on_frame(message).await;
                }
                Ok(None) => {
                    info!("Client disconnected or stream ended");
                    break Ok(());
                }
                Err(e) if e.is_recoverable() => {
                    error!(error = %e, "Dropping malformed frame");
                }
                Err(e) => {
                    error!(error = %e, "Failed to read from input stream");
                    break Err(e.into());
                }
            }
        };

        router.outbound.close().await;
        info!("Session closed");
        result
    }

    /// Routes one decoded frame.
    ///
    /// For requests the backend runs on a separate task whose handle is
    /// returned; it finishes once the response is written.
    pub async fn on_frame(&self, message: Value) -> Option<InFlightRequest> {
        self.router.on_frame(message).await
    }
}

/// Everything routing needs besides the input stream, so the read loop can
/// borrow it across awaits while owning the reader.
struct Router<B> {
    dispatcher: Dispatcher<B>,
    outbound: Arc<Outbound>,
}

impl<B: Backend> Router<B> {
    async fn on_frame(&self, message: Value) -> Option<InFlightRequest> {
        match MessageKind::of(&message) {
            MessageKind::Request => match serde_json::from_value::<Request>(message) {
                Ok(request) => self.dispatcher.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Dropping malformed request");
                    None
                }
            },
            MessageKind::Response => {
                match serde_json::from_value::<Response>(message) {
                    Ok(response) => {
                        let request_seq = response.request_seq;
                        if !self.outbound.pending.resolve(response) {
                            debug!(request_seq, "Ignoring response to unknown request");
                        }
                    }
                    Err(e) => error!(error = %e, "Dropping malformed response"),
                }
                None
            }
            MessageKind::Event | MessageKind::Unknown(_) => {
                self.reject_message_type(&message).await;
                None
            }
        }
    }

    async fn reject_message_type(&self, message: &Value) {
        let message_type = message.get("type").and_then(Value::as_str).unwrap_or_default();
        let request_seq = message.get("seq").and_then(Value::as_i64).unwrap_or_default();
        let command = message.get("command").and_then(Value::as_str).unwrap_or_default();
        debug!(request_seq, message_type, "Unrecognized message type");

        let reply = Reply::error(ErrorMessage::unrecognized_type(message_type));
        if let Err(e) = self.outbound.writer.write_response(request_seq, command, reply).await {
            debug!(request_seq, error = %e, "Failed to write response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HandlerError, HandlerResult};
    use async_trait::async_trait;
    use dap::requests::PauseArguments;
    use dap::responses::ThreadsResponse;
    use serde_json::json;
    use tokio::io::{DuplexStream, duplex};

    struct Failing;

    #[async_trait]
    impl Backend for Failing {
        async fn threads(&self) -> HandlerResult<ThreadsResponse> {
            Err(HandlerError::internal("boom"))
        }

        async fn pause(&self, _args: PauseArguments) -> HandlerResult<()> {
            std::future::pending().await
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    fn session() -> (Session<Failing>, FrameReader<BufReader<DuplexStream>>) {
        let (peer, server) = duplex(8192);
        let session = Session::new(tokio::io::empty(), server, |_| Failing);
        (session, FrameReader::new(BufReader::new(peer)))
    }

    #[tokio::test]
    async fn test_unrecognized_command() {
        let (session, mut peer) = session();
        let handle = session
            .on_frame(json!({"seq": 1, "type": "request", "command": "does-not-exist"}))
            .await;
        assert!(handle.is_none());

        assert_eq!(
            peer.read_frame().await.unwrap(),
            Some(json!({
                "type": "response",
                "seq": 1,
                "request_seq": 1,
                "success": false,
                "command": "does-not-exist",
                "message": "Unrecognized command: `does-not-exist`",
                "body": {
                    "error": {
                        "id": 1014,
                        "format": "Unrecognized command: {_cmd}",
                        "variables": {"_cmd": "does-not-exist"}
                    }
                }
            }))
        );
    }

    #[tokio::test]
    async fn test_unrecognized_message_type() {
        let (session, mut peer) = session();
        session.on_frame(json!({"seq": 9, "type": "notification"})).await;

        let frame = peer.read_frame().await.unwrap().unwrap();
        assert_eq!(frame["request_seq"], 9);
        assert_eq!(frame["success"], false);
        assert_eq!(frame["message"], "Unrecognized message type: `notification`");
        assert_eq!(frame["body"]["error"]["id"], 1014);
    }

    #[tokio::test]
    async fn test_inbound_event_is_rejected() {
        let (session, mut peer) = session();
        session.on_frame(json!({"seq": 3, "type": "event", "event": "output"})).await;

        let frame = peer.read_frame().await.unwrap().unwrap();
        assert_eq!(frame["request_seq"], 3);
        assert_eq!(frame["message"], "Unrecognized message type: `event`");
    }

    #[tokio::test]
    async fn test_internal_error_response() {
        let (session, mut peer) = session();
        let handle = session
            .on_frame(json!({"seq": 4, "type": "request", "command": "threads"}))
            .await
            .unwrap();
        handle.await.unwrap();

        let frame = peer.read_frame().await.unwrap().unwrap();
        assert_eq!(frame["request_seq"], 4);
        assert_eq!(frame["command"], "threads");
        assert_eq!(frame["success"], false);
        assert_eq!(frame["message"], "Internal Error: `boom`");
        assert_eq!(
            frame["body"]["error"],
            json!({"id": 1104, "format": "Internal Error: {_err}", "variables": {"_err": "boom"}})
        );
    }

    #[tokio::test]
    async fn test_malformed_request_is_dropped() {
        let (session, _peer) = session();
        let client = session.client();

        assert!(session.on_frame(json!({"seq": 1, "type": "request"})).await.is_none());
        assert!(session.on_frame(json!({"type": "response", "seq": "x"})).await.is_none());
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn test_run_closes_on_end_of_stream() {
        let (session, _peer) = session();
        let client = session.client();
        assert_eq!(session.state(), SessionState::Created);

        session.run().await.unwrap();
        assert_eq!(client.state(), SessionState::Closed);
        assert!(client.is_closed());
    }

    #[test]
    fn test_run_future_is_send() {
        let (session, _peer) = session();
        let run = session.run();
        assert_send(&run);
    }

    #[tokio::test]
    async fn test_aborted_request_is_answered_as_cancelled() {
        let (session, mut peer) = session();
        let handle = session
            .on_frame(json!({"seq": 6, "type": "request", "command": "pause", "arguments": {"threadId": 1}}))
            .await
            .unwrap();
        assert_eq!(handle.seq(), 6);

        handle.abort();
        handle.await.unwrap();

        assert_eq!(
            peer.read_frame().await.unwrap(),
            Some(json!({
                "type": "response",
                "seq": 1,
                "request_seq": 6,
                "success": false,
                "command": "pause",
                "message": "cancelled"
            }))
        );
    }
}
