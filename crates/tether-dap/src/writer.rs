use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec::FrameWriter;
use crate::error::{CodecError, SessionError};
use crate::protocol::{Event, ProtocolMessage, Request, Response};
use crate::sequence::SequenceCounter;
use crate::translate::Reply;

pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The single write path of a session.
///
/// Every outbound message takes its `seq` from the session counter and is
/// written while holding the frame lock, so frames never interleave and
/// `seq` values reach the peer in increasing order.
pub struct MessageWriter {
    frames: Mutex<FrameWriter<BoxedWriter>>,
    seq: SequenceCounter,
    closed: AtomicBool,
}

impl MessageWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            frames: Mutex::new(FrameWriter::new(Box::new(writer) as BoxedWriter)),
            seq: SequenceCounter::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn write_response(&self, request_seq: i64, command: &str, reply: Reply) -> Result<i64, SessionError> {
        self.write_with(|seq| {
            ProtocolMessage::Response(Response {
                seq,
                request_seq,
                success: reply.success,
                command: command.to_string(),
                message: reply.message,
                body: reply.body,
            })
        })
        .await
    }

    pub async fn emit_event(&self, event: &str, body: Option<Value>) -> Result<i64, SessionError> {
        self.write_with(|seq| {
            ProtocolMessage::Event(Event {
                seq,
                event: event.to_string(),
                body,
            })
        })
        .await
    }

    /// Writes a request. `register` runs with the allocated `seq` before any
    /// byte reaches the peer, so a reply can never outrun its bookkeeping.
    pub async fn write_request<F>(
        &self,
        command: &str,
        arguments: Option<Value>,
        register: F,
    ) -> Result<i64, SessionError>
    where
        F: FnOnce(i64),
    {
        self.write_with(|seq| {
            register(seq);
            ProtocolMessage::Request(Request {
                seq,
                command: command.to_string(),
                arguments,
            })
        })
        .await
    }

    /// Allocates the next `seq` and writes the message built from it, both
    /// under the frame lock so that `seq` grows in wire order.
    async fn write_with<F>(&self, build: F) -> Result<i64, SessionError>
    where
        F: FnOnce(i64) -> ProtocolMessage,
    {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let mut frames = self.frames.lock().await;
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let message = build(self.seq.next());
        let seq = message.seq();
        let value = serde_json::to_value(&message)?;

        match frames.write_frame(&value).await {
            Ok(()) => Ok(seq),
            Err(CodecError::Io(e)) => {
                warn!(error = %e, seq, "Failed to write message, closing output");
                self.closed.store(true, Ordering::SeqCst);
                Err(CodecError::Io(e).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rejects further writes and shuts the underlying sink down.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.frames.lock().await.shutdown().await {
            debug!(error = %e, "Failed to shut down output stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameReader;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{BufReader, duplex};

    #[tokio::test]
    async fn test_messages_share_one_sequence() {
        let (client, server) = duplex(4096);
        let writer = MessageWriter::new(server);
        let mut reader = FrameReader::new(BufReader::new(client));

        assert_eq!(writer.emit_event("initialized", None).await.unwrap(), 1);
        assert_eq!(
            writer
                .write_response(7, "threads", Reply::success(Some(json!({"threads": []}))))
                .await
                .unwrap(),
            2
        );

        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(json!({"type": "event", "seq": 1, "event": "initialized"}))
        );
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(json!({
                "type": "response",
                "seq": 2,
                "request_seq": 7,
                "success": true,
                "command": "threads",
                "body": {"threads": []}
            }))
        );
    }

    #[tokio::test]
    async fn test_write_after_close_is_rejected() {
        let (_client, server) = duplex(1024);
        let writer = MessageWriter::new(server);

        writer.close().await;
        assert!(writer.is_closed());
        assert!(matches!(
            writer.emit_event("output", None).await,
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_broken_pipe_closes_writer() {
        let (client, server) = duplex(1024);
        drop(client);
        let writer = MessageWriter::new(server);

        assert!(writer.emit_event("output", None).await.is_err());
        assert!(writer.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_do_not_interleave() {
        let (client, server) = duplex(64);
        let writer = Arc::new(MessageWriter::new(server));

        let reader = tokio::spawn(async move {
            let mut reader = FrameReader::new(BufReader::new(client));
            let mut frames = Vec::new();
            while frames.len() < 40 {
                match reader.read_frame().await.unwrap() {
                    Some(frame) => frames.push(frame),
                    None => break,
                }
            }
            frames
        });

        let tasks = (0..40)
            .map(|i| {
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    let output = "x".repeat(100 + i);
                    writer
                        .emit_event("output", Some(json!({"output": output})))
                        .await
                        .unwrap();
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }

        let frames = reader.await.unwrap();
        assert_eq!(frames.len(), 40);
        let seqs = frames
            .iter()
            .map(|frame| frame["seq"].as_i64().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(seqs, (1..=40).collect::<Vec<_>>());
        assert!(frames.iter().all(|frame| frame["event"] == "output"));
    }
}
