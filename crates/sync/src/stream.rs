//! Consumes the server's sync progress stream.
//!
//! Chunks are buffered until a full line is available; only complete lines are
//! parsed. Every session ends with exactly one terminal event: either the one
//! the server sent, or a synthetic `error` when the stream fails, stalls or
//! closes early.

use std::time::Duration;
use tracing::{debug, warn};

use programsync_core::SyncProgressEvent;
use programsync_core::event::{EventLineError, parse_event_line};

use crate::source::ChunkSource;

/// Longest unfinished line the consumer will hold before giving up on a stream.
pub const MAX_PENDING_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream into complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to contain no newline
    scanned: usize,
    max_pending: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_pending(MAX_PENDING_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_pending,
        }
    }

    /// Append `chunk` and drain every line it completes, without the trailing
    /// `\n` / `\r\n`. Bytes after the last newline stay buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[self.scanned..].iter().position(|byte| *byte == b'\n') {
            let newline_index = self.scanned + offset;
            let mut line = &self.buf[start..newline_index];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = newline_index + 1;
            self.scanned = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        lines
    }

    /// Bytes of an unfinished line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// The unfinished line has grown past the configured limit.
    pub fn overflowed(&self) -> bool {
        self.buf.len() > self.max_pending
    }
}

pub struct SyncStreamConsumer {
    source: Box<dyn ChunkSource>,
    lines: LineBuffer,
    idle_timeout: Option<Duration>,
}

impl SyncStreamConsumer {
    pub fn new(source: Box<dyn ChunkSource>) -> Self {
        Self {
            source,
            lines: LineBuffer::new(),
            idle_timeout: None,
        }
    }

    /// Treat the stream as failed if no chunk arrives within `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Fail the session once an unfinished line holds more than `bytes`.
    pub fn with_max_line_bytes(mut self, bytes: usize) -> Self {
        self.lines = LineBuffer::with_max_pending(bytes);
        self
    }

    /// Read the stream to its terminal event, forwarding every event to
    /// `on_event` in arrival order. Returns the terminal event.
    pub async fn run<F>(mut self, mut on_event: F) -> SyncProgressEvent
    where
        F: FnMut(&SyncProgressEvent),
    {
        loop {
            let next = match self.idle_timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.source.next_chunk())
                    .await
                    .ok(),
                None => Some(self.source.next_chunk().await),
            };
            let Some(next) = next else {
                let idle = self.idle_timeout.unwrap_or_default();
                return self.fail(
                    format!("sync stream stalled: no data for {idle:?}"),
                    &mut on_event,
                );
            };

            match next {
                Ok(Some(chunk)) => {
                    for line in self.lines.push(&chunk) {
                        let Some(event) = dispatchable(&line) else {
                            continue;
                        };
                        on_event(&event);
                        if event.is_terminal() {
                            debug!("Sync stream reached terminal `{}` event", event.kind());
                            self.source.cancel();
                            return event;
                        }
                    }
                    if self.lines.overflowed() {
                        let pending = self.lines.pending();
                        return self.fail(
                            format!("sync stream line exceeds {pending} bytes without a newline"),
                            &mut on_event,
                        );
                    }
                }
                Ok(None) => {
                    if self.lines.pending() > 0 {
                        debug!(
                            "Dropping {} bytes of an unterminated line at end of stream",
                            self.lines.pending()
                        );
                    }
                    return self.fail(
                        "sync stream closed before completion".to_string(),
                        &mut on_event,
                    );
                }
                Err(e) => {
                    return self.fail(format!("sync stream read failed: {e:#}"), &mut on_event);
                }
            }
        }
    }

    fn fail<F>(self, message: String, on_event: &mut F) -> SyncProgressEvent
    where
        F: FnMut(&SyncProgressEvent),
    {
        warn!("{message}");
        self.source.cancel();
        let event = SyncProgressEvent::error(message);
        on_event(&event);
        event
    }
}

/// Parse a line, logging and skipping anything that is not a valid event.
fn dispatchable(line: &str) -> Option<SyncProgressEvent> {
    match parse_event_line(line) {
        Ok(event) => event,
        Err(EventLineError::MissingMarker(line)) => {
            debug!("Ignoring non-event stream line: {line:?}");
            None
        }
        Err(e) => {
            warn!("Skipping malformed sync event: {e}");
            None
        }
    }
}
