//! Polling frame encoder.
//!
//! Multiple logical writers append complete frames to one shared buffer, one
//! writer at a time. A single drain flushes every finished frame to the HTTP
//! response when a frame closes, or gives up at the keep-alive deadline so the
//! caller can emit a ping.
//!
//! ```text
//!  next_frame ──► FrameWriter ──write──► buffer ◄── write_frames_to ──► response
//!                     │ close                ▲
//!                     └──────► ready cell ───┘
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::{GeneralPurpose, STANDARD};
use base64::write::EncoderWriter;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

use super::error::FrameError;
use super::frame::FrameType;
use super::signal::{Shutdown, WakeCell};
use crate::core::constants::{BINARY_FRAME_PREFIX, DEFAULT_FRAME_BUFFER_CAPACITY, FRAME_SEPARATOR};

/// Accumulated frames plus the boundary of the last terminated one.
#[derive(Debug)]
struct FrameBuffer {
    bytes: Vec<u8>,
    /// Bytes before this offset belong to terminated frames.
    finished: usize,
}

#[derive(Debug)]
struct Shared {
    buffer: Mutex<FrameBuffer>,
    ready: WakeCell,
    closed: Shutdown,
    writer_open: AtomicBool,
}

impl Shared {
    fn append(&self, bytes: &[u8]) {
        self.buffer.lock().bytes.extend_from_slice(bytes);
    }

    fn terminate_frame(&self) {
        let mut buffer = self.buffer.lock();
        buffer.bytes.push(FRAME_SEPARATOR);
        buffer.finished = buffer.bytes.len();
    }

    /// Drop the bytes of an unterminated frame.
    fn discard_open_frame(&self) {
        let mut buffer = self.buffer.lock();
        let finished = buffer.finished;
        buffer.bytes.truncate(finished);
    }

    fn take_finished(&self) -> Vec<u8> {
        let mut buffer = self.buffer.lock();
        let finished = std::mem::take(&mut buffer.finished);
        buffer.bytes.drain(..finished).collect()
    }

    fn release_writer(&self) {
        self.writer_open.store(false, Ordering::Release);
    }
}

/// Appends base64 output straight into the shared buffer.
struct BufferSink {
    shared: Arc<Shared>,
}

impl io::Write for BufferSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.shared.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Buffered multi-frame writer for the polling transport.
///
/// At most one [`FrameWriter`] is open at any instant; a second concurrent
/// `next_frame` is rejected rather than queued. Exactly one task may drain
/// with [`write_frames_to`](Self::write_frames_to) at a time.
#[derive(Debug)]
pub struct FrameEncoder {
    ping_timeout: Duration,
    last_ping: Mutex<Instant>,
    shared: Arc<Shared>,
}

impl FrameEncoder {
    /// Create an encoder whose drain ends when `closed` fires.
    pub fn new(ping_timeout: Duration, closed: Shutdown) -> Self {
        Self::with_buffer(
            ping_timeout,
            closed,
            Vec::with_capacity(DEFAULT_FRAME_BUFFER_CAPACITY),
        )
    }

    /// Create an encoder reusing `buf` as frame storage.
    pub fn with_buffer(ping_timeout: Duration, closed: Shutdown, mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self {
            ping_timeout,
            last_ping: Mutex::new(Instant::now()),
            shared: Arc::new(Shared {
                buffer: Mutex::new(FrameBuffer {
                    bytes: buf,
                    finished: 0,
                }),
                ready: WakeCell::new(),
                closed,
                writer_open: AtomicBool::new(false),
            }),
        }
    }

    /// Keep-alive deadline of this encoder.
    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    /// Open the next frame.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Closed`] once the closed signal has fired.
    /// - [`FrameError::NonClosedFrame`] while another writer is still open.
    pub fn next_frame(&self, frame_type: FrameType) -> Result<FrameWriter, FrameError> {
        if self.shared.closed.is_fired() {
            return Err(FrameError::Closed);
        }

        if self
            .shared
            .writer_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FrameError::NonClosedFrame);
        }

        let base64 = match frame_type {
            FrameType::Text => None,
            FrameType::Binary => {
                self.shared.append(&[BINARY_FRAME_PREFIX]);
                let sink = BufferSink {
                    shared: Arc::clone(&self.shared),
                };
                Some(EncoderWriter::new(sink, &STANDARD))
            }
        };

        debug!(?frame_type, "frame opened");
        Ok(FrameWriter {
            shared: Arc::clone(&self.shared),
            frame_type,
            base64,
            terminated: false,
        })
    }

    /// Wait for finished frames and flush all of them to `output`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`FrameError::PingTimeout`] if the keep-alive deadline passes first;
    ///   the deadline restarts from now.
    /// - [`FrameError::Closed`] if the closed signal fires first.
    pub async fn write_frames_to<W>(&self, output: &mut W) -> Result<usize, FrameError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let elapsed = self.last_ping.lock().elapsed();
        let remaining = self.ping_timeout.saturating_sub(elapsed);

        tokio::select! {
            biased;
            _ = self.shared.ready.wait() => {}
            _ = self.shared.closed.wait() => return Err(FrameError::Closed),
            _ = tokio::time::sleep(remaining) => {
                *self.last_ping.lock() = Instant::now();
                debug!("drain hit ping deadline");
                return Err(FrameError::PingTimeout);
            }
        }

        let frames = self.shared.take_finished();
        output.write_all(&frames).await?;
        debug!(bytes = frames.len(), "frames drained");
        Ok(frames.len())
    }

    /// Wait until an open frame writer, if any, is closed.
    ///
    /// Only guarantees that *some* close happened, not that it was the writer
    /// open at call time. The consumed wakeup is re-posted so a pending drain
    /// still sees it.
    pub async fn wait_frame_close(&self) {
        if !self.shared.writer_open.load(Ordering::Acquire) {
            return;
        }

        self.shared.ready.wait().await;
        self.shared.ready.post();
    }

    /// Whether a frame writer is currently open.
    pub fn has_open_frame(&self) -> bool {
        self.shared.writer_open.load(Ordering::Acquire)
    }

    /// Fire the closed signal: pending and future drains end with
    /// [`FrameError::Closed`].
    pub fn close(&self) {
        self.shared.closed.fire();
    }

    /// Whether the closed signal has fired.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_fired()
    }
}

/// Handle to one open frame.
///
/// Single use: [`close`](Self::close) consumes it. Dropping it without closing
/// discards the partial frame and frees the encoder for the next writer.
pub struct FrameWriter {
    shared: Arc<Shared>,
    frame_type: FrameType,
    base64: Option<EncoderWriter<'static, GeneralPurpose, BufferSink>>,
    terminated: bool,
}

impl FrameWriter {
    /// Kind of frame being written.
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Append payload bytes.
    ///
    /// # Errors
    ///
    /// [`FrameError::SeparatorInTextFrame`] if a text payload contains the
    /// separator byte; nothing is appended in that case.
    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        match self.base64.as_mut() {
            Some(encoder) => io::Write::write_all(encoder, bytes).map_err(FrameError::from),
            None => {
                if bytes.contains(&FRAME_SEPARATOR) {
                    return Err(FrameError::SeparatorInTextFrame);
                }
                self.shared.append(bytes);
                Ok(())
            }
        }
    }

    /// Terminate the frame and wake the drain.
    pub fn close(mut self) -> Result<(), FrameError> {
        if let Some(mut encoder) = self.base64.take() {
            encoder.finish()?;
        }

        self.shared.terminate_frame();
        self.terminated = true;
        self.shared.release_writer();
        // A pending wakeup already covers this frame.
        self.shared.ready.post();
        debug!(frame_type = ?self.frame_type, "frame closed");
        Ok(())
    }
}

impl io::Write for FrameWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_frame(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if self.terminated {
            return;
        }
        // The base64 writer flushes its tail on drop; discard after it.
        drop(self.base64.take());
        self.shared.discard_open_frame();
        self.shared.release_writer();
        debug!(frame_type = ?self.frame_type, "frame abandoned");
    }
}

impl fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameWriter")
            .field("frame_type", &self.frame_type)
            .field("terminated", &self.terminated)
            .finish()
    }
}
