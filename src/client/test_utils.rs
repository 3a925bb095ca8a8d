//! Test doubles for the transport collaborators.
//!
//! [`MockDialer`] hands the test a [`Session`] for every successful dial.
//! The session sees what the client encoded and scripts what it decodes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::core::{
    CodecError, DialError, Dialer, Header, Packet, PacketDecoder, PacketEncoder, TransportKind,
};
use crate::transport::{FrameEncoder, FrameType, Shutdown};

type Inbound = Result<(Header, Option<String>, Vec<Value>), CodecError>;

#[derive(Default)]
struct SessionShared {
    encoder_closed: AtomicBool,
    reject: Mutex<Option<CodecError>>,
}

/// Test side of one dialed connection.
pub(crate) struct Session {
    sent: mpsc::UnboundedReceiver<Packet>,
    inbound: mpsc::UnboundedSender<Inbound>,
    shared: Arc<SessionShared>,
    frames: Option<Arc<FrameEncoder>>,
}

impl Session {
    /// Next packet the client encoded. `None` once the encoder is gone.
    pub async fn sent(&mut self) -> Option<Packet> {
        self.sent.recv().await
    }

    /// Deliver a packet to the client's decoder.
    pub fn push(&self, header: Header, event: Option<&str>, args: Vec<Value>) {
        let _ = self
            .inbound
            .send(Ok((header, event.map(str::to_owned), args)));
    }

    /// Make the client's next decode fail with `err`.
    pub fn fail(&self, err: CodecError) {
        let _ = self.inbound.send(Err(err));
    }

    /// Make the client's next encode fail with `err`.
    pub fn reject_next_encode(&self, err: CodecError) {
        *self.shared.reject.lock() = Some(err);
    }

    /// Whether the client closed its encoder.
    pub fn encoder_closed(&self) -> bool {
        self.shared.encoder_closed.load(Ordering::SeqCst)
    }

    /// Frame buffer written by a polling session.
    pub fn frames(&self) -> Option<Arc<FrameEncoder>> {
        self.frames.clone()
    }
}

/// Encoder that hands packets to the test.
pub(crate) struct RecordingEncoder {
    sent: mpsc::UnboundedSender<Packet>,
}

/// Encoder writing each packet as one JSON text frame.
pub(crate) struct PollingCodec {
    frames: Arc<FrameEncoder>,
}

pub(crate) enum MockEncoder {
    Recording(RecordingEncoder),
    Polling(PollingCodec),
}

pub(crate) struct SessionEncoder {
    inner: MockEncoder,
    shared: Arc<SessionShared>,
}

impl PacketEncoder for SessionEncoder {
    async fn encode(&mut self, header: &Header, args: &[Value]) -> Result<(), CodecError> {
        if let Some(err) = self.shared.reject.lock().take() {
            return Err(err);
        }
        match &mut self.inner {
            MockEncoder::Recording(encoder) => encoder
                .sent
                .send(Packet {
                    header: header.clone(),
                    args: args.to_vec(),
                })
                .map_err(|_| CodecError::Closed),
            MockEncoder::Polling(codec) => {
                let body = serde_json::to_vec(&json!({ "header": header, "args": args }))
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
                let mut writer = codec.frames.next_frame(FrameType::Text)?;
                writer.write_frame(&body)?;
                writer.close()?;
                Ok(())
            }
        }
    }

    async fn close(&mut self) -> Result<(), CodecError> {
        self.shared.encoder_closed.store(true, Ordering::SeqCst);
        if let MockEncoder::Polling(codec) = &self.inner {
            codec.frames.close();
        }
        Ok(())
    }
}

/// Decoder replaying what the test pushes. Fails with `Closed` once the
/// session is dropped.
pub(crate) struct ScriptedDecoder {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    pending: Vec<Value>,
}

impl PacketDecoder for ScriptedDecoder {
    async fn decode_header(&mut self) -> Result<(Header, Option<String>), CodecError> {
        match self.inbound.recv().await {
            Some(Ok((header, event, args))) => {
                self.pending = args;
                Ok((header, event))
            }
            Some(Err(err)) => Err(err),
            None => Err(CodecError::Closed),
        }
    }

    async fn decode_args(&mut self) -> Result<Vec<Value>, CodecError> {
        Ok(std::mem::take(&mut self.pending))
    }
}

struct DialerState {
    dials: AtomicUsize,
    failures: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    hang_up: AtomicBool,
    last: Mutex<Option<(String, Vec<TransportKind>)>>,
    polling: Option<Duration>,
    sessions_tx: mpsc::UnboundedSender<Session>,
    sessions_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Session>>,
}

/// Dialer producing in-memory sessions.
#[derive(Clone)]
pub(crate) struct MockDialer {
    state: Arc<DialerState>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Sessions whose encoder writes into a [`FrameEncoder`].
    pub fn polling(ping_timeout: Duration) -> Self {
        Self::build(Some(ping_timeout))
    }

    fn build(polling: Option<Duration>) -> Self {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(DialerState {
                dials: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                delay: Mutex::new(None),
                hang_up: AtomicBool::new(false),
                last: Mutex::new(None),
                polling,
                sessions_tx,
                sessions_rx: tokio::sync::Mutex::new(sessions_rx),
            }),
        }
    }

    /// Fail the next `n` dials.
    pub fn fail_next(&self, n: usize) {
        self.state.failures.store(n, Ordering::SeqCst);
    }

    /// Make every later dial take `delay` before it succeeds or fails.
    pub fn delay_dials(&self, delay: Duration) {
        *self.state.delay.lock() = Some(delay);
    }

    /// Sessions dialed from now on hand the client a decoder whose stream
    /// has already ended.
    pub fn hang_up_on_dial(&self) {
        self.state.hang_up.store(true, Ordering::SeqCst);
    }

    /// Dials attempted so far, failed ones included.
    pub fn dials(&self) -> usize {
        self.state.dials.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.state.last.lock().as_ref().map(|(url, _)| url.clone())
    }

    pub fn last_transports(&self) -> Vec<TransportKind> {
        self.state
            .last
            .lock()
            .as_ref()
            .map(|(_, transports)| transports.clone())
            .unwrap_or_default()
    }

    /// Wait for the next successful dial.
    pub async fn next_session(&self) -> Session {
        self.state
            .sessions_rx
            .lock()
            .await
            .recv()
            .await
            .expect("dialer state owns the sender")
    }
}

impl Dialer for MockDialer {
    type Encoder = SessionEncoder;
    type Decoder = ScriptedDecoder;

    async fn dial(
        &self,
        url: &str,
        transports: &[TransportKind],
    ) -> Result<(SessionEncoder, ScriptedDecoder), DialError> {
        self.state.dials.fetch_add(1, Ordering::SeqCst);
        *self.state.last.lock() = Some((url.to_owned(), transports.to_vec()));

        let delay = *self.state.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .state
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DialError::Unreachable(url.to_owned()));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        if self.state.hang_up.load(Ordering::SeqCst) {
            let (_, closed) = mpsc::unbounded_channel();
            inbound_rx = closed;
        }
        let shared = Arc::new(SessionShared::default());

        let (inner, frames) = match self.state.polling {
            Some(ping_timeout) => {
                let frames = Arc::new(FrameEncoder::new(ping_timeout, Shutdown::new()));
                let codec = PollingCodec {
                    frames: Arc::clone(&frames),
                };
                (MockEncoder::Polling(codec), Some(frames))
            }
            None => (
                MockEncoder::Recording(RecordingEncoder { sent: sent_tx }),
                None,
            ),
        };

        let session = Session {
            sent: sent_rx,
            inbound: inbound_tx,
            shared: Arc::clone(&shared),
            frames,
        };
        let _ = self.state.sessions_tx.send(session);

        let encoder = SessionEncoder { inner, shared };
        let decoder = ScriptedDecoder {
            inbound: inbound_rx,
            pending: Vec::new(),
        };
        Ok((encoder, decoder))
    }
}
