use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::trace;

use crate::transport::NetworkError;

/// Payload that ends the stream successfully.
pub const DONE_MARKER: &str = "[DONE]";

/// Splits raw bytes into lines, holding back an incomplete tail until the
/// rest of it arrives. Bytes are kept undecoded until a full line is
/// present so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no `\n`.
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line without its `\n` or `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.pending[self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
        else {
            self.scanned = self.pending.len();
            return None;
        };
        let end = self.scanned + offset;
        self.scanned = 0;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.scanned = 0;
        let mut rest = std::mem::take(&mut self.pending);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// The payload of a `data:` line, with at most one leading space removed.
/// Every other line yields `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

/// Turns a response body into the payloads of its `data:` lines.
///
/// Consumable once. Reaching the `[DONE]` marker ends the stream and
/// releases the body, leaving any bytes after it unread. A read error is
/// yielded once and also ends the stream.
pub struct FrameDecoder<S> {
    inner: Option<S>,
    lines: LineBuffer,
    saw_done: bool,
    finished: bool,
}

impl<S> FrameDecoder<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Some(inner),
            lines: LineBuffer::new(),
            saw_done: false,
            finished: false,
        }
    }

    /// True once the `[DONE]` marker was decoded.
    pub fn saw_done_marker(&self) -> bool {
        self.saw_done
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop decoding and drop the underlying body.
    pub fn close(&mut self) {
        self.finished = true;
        self.inner = None;
        self.lines = LineBuffer::new();
    }

    /// Classify one complete line. `Some(Some(payload))` is a frame,
    /// `Some(None)` means the stream is done, `None` means skip the line.
    fn frame_from_line(&mut self, line: &str) -> Option<Option<String>> {
        let payload = data_payload(line)?;
        if payload.trim() == DONE_MARKER {
            trace!("Done marker decoded");
            self.saw_done = true;
            self.close();
            return Some(None);
        }
        Some(Some(payload.to_string()))
    }
}

impl<S> Stream for FrameDecoder<S>
where
    S: Stream<Item = Result<Bytes, NetworkError>> + Unpin,
{
    type Item = Result<String, NetworkError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            while let Some(line) = this.lines.next_line() {
                match this.frame_from_line(&line) {
                    Some(Some(frame)) => return Poll::Ready(Some(Ok(frame))),
                    Some(None) => return Poll::Ready(None),
                    None => continue,
                }
            }

            let Some(inner) = this.inner.as_mut() else {
                this.finished = true;
                return Poll::Ready(None);
            };

            match Pin::new(inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.lines.push(&bytes);
                }
                Poll::Ready(Some(Err(err))) => {
                    this.close();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    let tail = this.lines.finish();
                    this.finished = true;
                    if let Some(line) = tail {
                        if let Some(Some(frame)) = this.frame_from_line(&line) {
                            return Poll::Ready(Some(Ok(frame)));
                        }
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
