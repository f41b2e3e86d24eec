use std::io::{self, Write};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing_subscriber::fmt::MakeWriter;

/// Log sink that hands formatted lines to the session so they can be shown in
/// the client's debug console.
#[derive(Clone)]
pub struct DebugConsoleWriter {
    sender: UnboundedSender<String>,
}

impl DebugConsoleWriter {
    pub fn new() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: tx }, rx)
    }
}

impl Write for DebugConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A closed channel means nobody forwards logs anymore; the line is dropped.
        let _ = self.sender.send(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DebugConsoleWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
