use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ReverseRequestError;
use crate::protocol::Response;

/// Requests sent to the peer that still wait for a response, keyed by `seq`.
#[derive(Debug, Default)]
pub struct PendingRequests {
    table: DashMap<i64, oneshot::Sender<Response>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, seq: i64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.table.insert(seq, tx);
        rx
    }

    /// Hands `response` to whoever waits on its `request_seq`.
    ///
    /// Returns `false` when nobody does, either because the `request_seq` was
    /// never issued or because it has already been answered.
    pub fn resolve(&self, response: Response) -> bool {
        match self.table.remove(&response.request_seq) {
            Some((seq, tx)) => {
                if tx.send(response).is_err() {
                    debug!(seq, "Response arrived after its handle was dropped");
                }
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, seq: i64) -> bool {
        self.table.remove(&seq).is_some()
    }

    pub fn contains(&self, seq: i64) -> bool {
        self.table.contains_key(&seq)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Fails every outstanding handle with [`ReverseRequestError::SessionClosed`].
    pub fn close(&self) -> usize {
        let count = self.table.len();
        self.table.clear();
        count
    }
}

/// Completion handle for a request sent to the peer.
///
/// Resolves with the response body decoded as `T`. A response without a body
/// is decoded from `null`, so use `Option<_>` or [`Value`] when the body may
/// be absent.
#[must_use = "the peer's response is only observed by awaiting the handle"]
pub struct PendingResponse<T> {
    seq: i64,
    command: String,
    rx: oneshot::Receiver<Response>,
    table: Weak<PendingRequests>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for PendingResponse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("seq", &self.seq)
            .field("command", &self.command)
            .finish()
    }
}

impl<T> PendingResponse<T> {
    pub(crate) fn new(
        seq: i64,
        command: impl Into<String>,
        rx: oneshot::Receiver<Response>,
        table: &Arc<PendingRequests>,
    ) -> Self {
        Self {
            seq,
            command: command.into(),
            rx,
            table: Arc::downgrade(table),
            _marker: PhantomData,
        }
    }

    /// The `seq` the request was sent with.
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl<T> Future for PendingResponse<T>
where
    T: DeserializeOwned,
{
    type Output = Result<T, ReverseRequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(_)) => Poll::Ready(Err(ReverseRequestError::SessionClosed)),
            Poll::Ready(Ok(response)) => Poll::Ready(decode(&self.command, response)),
        }
    }
}

impl<T> Drop for PendingResponse<T> {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade()
            && table.remove(self.seq)
        {
            debug!(seq = self.seq, "Abandoned reverse request");
        }
    }
}

fn decode<T: DeserializeOwned>(expected: &str, response: Response) -> Result<T, ReverseRequestError> {
    if response.command != expected {
        return Err(ReverseRequestError::UnexpectedCommand {
            expected: expected.to_string(),
            actual: response.command,
        });
    }

    if !response.success {
        return Err(ReverseRequestError::Rejected {
            command: response.command,
            message: response.message.unwrap_or_default(),
        });
    }

    serde_json::from_value(response.body.unwrap_or(Value::Null)).map_err(ReverseRequestError::InvalidBody)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    fn response(request_seq: i64, command: &str, success: bool, body: Option<Value>) -> Response {
        Response {
            seq: 100 + request_seq,
            request_seq,
            success,
            command: command.to_string(),
            message: (!success).then(|| "denied".to_string()),
            body,
        }
    }

    fn pending<T>(table: &Arc<PendingRequests>, seq: i64, command: &str) -> PendingResponse<T> {
        PendingResponse::new(seq, command, table.register(seq), table)
    }

    #[tokio::test]
    async fn test_resolve_matching_response() {
        let table = Arc::new(PendingRequests::new());
        let handle = pending::<Value>(&table, 3, "runInTerminal");

        assert!(table.resolve(response(3, "runInTerminal", true, Some(json!({"processId": 42})))));
        assert!(table.is_empty());
        assert_eq!(handle.await.unwrap(), json!({"processId": 42}));
    }

    #[tokio::test]
    async fn test_unknown_request_seq_is_ignored() {
        let table = Arc::new(PendingRequests::new());
        let mut handle = pending::<Value>(&table, 3, "runInTerminal");

        assert!(!table.resolve(response(4, "runInTerminal", true, None)));
        assert!(table.contains(3));
        assert!((&mut handle).now_or_never().is_none());

        assert!(table.resolve(response(3, "runInTerminal", true, Some(json!({})))));
        assert!(!table.resolve(response(3, "runInTerminal", true, Some(json!({})))));
        assert_eq!(handle.await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_unexpected_command_fails() {
        let table = Arc::new(PendingRequests::new());
        let handle = pending::<Value>(&table, 1, "runInTerminal");

        table.resolve(response(1, "startDebugging", true, None));
        assert!(matches!(
            handle.await,
            Err(ReverseRequestError::UnexpectedCommand { expected, actual })
                if expected == "runInTerminal" && actual == "startDebugging"
        ));
    }

    #[tokio::test]
    async fn test_rejected_response() {
        let table = Arc::new(PendingRequests::new());
        let handle = pending::<Value>(&table, 1, "runInTerminal");

        table.resolve(response(1, "runInTerminal", false, None));
        assert!(matches!(
            handle.await,
            Err(ReverseRequestError::Rejected { message, .. }) if message == "denied"
        ));
    }

    #[tokio::test]
    async fn test_body_shape_mismatch() {
        let table = Arc::new(PendingRequests::new());
        let handle = pending::<Vec<i64>>(&table, 1, "runInTerminal");

        table.resolve(response(1, "runInTerminal", true, Some(json!({"processId": 1}))));
        assert!(matches!(handle.await, Err(ReverseRequestError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_close_fails_pending_handles() {
        let table = Arc::new(PendingRequests::new());
        let first = pending::<Value>(&table, 1, "runInTerminal");
        let second = pending::<Value>(&table, 2, "runInTerminal");

        assert_eq!(table.close(), 2);
        assert!(matches!(first.await, Err(ReverseRequestError::SessionClosed)));
        assert!(matches!(second.await, Err(ReverseRequestError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_dropped_handle_releases_entry() {
        let table = Arc::new(PendingRequests::new());
        let kept = pending::<Value>(&table, 8, "runInTerminal");
        drop(pending::<Value>(&table, 9, "runInTerminal"));

        assert!(!table.contains(9));
        assert!(table.contains(8));
        assert!(!table.resolve(response(9, "runInTerminal", true, None)));

        drop(kept);
        assert!(table.is_empty());
    }

    #[test]
    fn test_handle_outliving_table() {
        let table = Arc::new(PendingRequests::new());
        let handle = pending::<Value>(&table, 1, "runInTerminal");

        drop(table);
        drop(handle);
    }
}
