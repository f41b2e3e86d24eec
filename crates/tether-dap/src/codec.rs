//! `Content-Length` framing for DAP messages.
//!
//! ```text
//! Content-Length: 82\r\n
//! \r\n
//! {"seq":1,"type":"request","command":"initialize","arguments":{"adapterID":"mock"}}
//! ```

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::CodecError;

const CONTENT_LENGTH: &str = "Content-Length";

/// Largest body [`FrameReader::new`] accepts.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Reads framed JSON messages from a buffered byte stream.
pub struct FrameReader<R> {
    reader: R,
    line: Vec<u8>,
    max_length: usize,
}

impl<R> FrameReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self::with_max_length(reader, DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Frames announcing more than `max_length` body bytes are rejected with
    /// [`CodecError::FrameTooLarge`] before any of the body is read.
    pub fn with_max_length(reader: R, max_length: usize) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(64),
            max_length,
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` once the stream ends, including when it ends in the
    /// middle of a frame. Errors other than [`CodecError::Io`] leave the stream
    /// positioned at the start of the next frame.
    pub async fn read_frame(&mut self) -> Result<Option<Value>, CodecError> {
        let mut content_length: Option<Result<usize, String>> = None;

        loop {
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line).await?;
            if n == 0 || self.line.last() != Some(&b'\n') {
                return Ok(None);
            }

            let line = String::from_utf8_lossy(&self.line);
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                break;
            }

            if let Some((key, value)) = line.split_once(':')
                && key == CONTENT_LENGTH
            {
                let value = value.trim();
                content_length = Some(value.parse::<usize>().map_err(|_| value.to_string()));
            }
        }

        let length = match content_length {
            Some(Ok(length)) => length,
            Some(Err(value)) => return Err(CodecError::InvalidContentLength(value)),
            None => return Err(CodecError::MissingContentLength),
        };

        if length > self.max_length {
            return Err(CodecError::FrameTooLarge {
                length,
                max: self.max_length,
            });
        }

        // The buffer grows with the bytes that actually arrive.
        let mut body = Vec::with_capacity(length.min(8 * 1024));
        (&mut self.reader).take(length as u64).read_to_end(&mut body).await?;
        if body.len() < length {
            return Ok(None);
        }

        let text = String::from_utf8(body)?;
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(body = %text, "Received frame");
        }

        Ok(Some(serde_json::from_str(&text)?))
    }
}

/// Serializes `message` and prefixes it with its header block.
pub fn encode_frame(message: &Value) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(message)?;
    let header = format!("{}: {}\r\n\r\n", CONTENT_LENGTH, body.len());

    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Writes whole frames to a byte sink.
///
/// Each frame goes out in a single `write_all`; callers sharing a writer must
/// still hold a lock around [`FrameWriter::write_frame`].
pub struct FrameWriter<W> {
    writer: W,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, message: &Value) -> Result<(), CodecError> {
        let frame = encode_frame(message)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;

        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(body = %message, "Sent frame");
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.writer.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
