//! Connection controller.
//!
//! [`Client`] dials a transport, sends the namespace connect packet and runs
//! three tasks per connection generation:
//!
//! - **read**: decodes packets and dispatches them to namespace handlers
//! - **write**: drains the outgoing queue through the packet encoder
//! - **error relay**: hands queued errors to the namespace error handlers
//!
//! When a generation dies and reconnection is enabled, a request is queued
//! to a single supervisor task that owns the backoff. It waits out the next
//! delay and dials again, so reconnection attempts never overlap.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::backoff::BackoffPolicy;
use super::config::ClientConfig;
use super::connection::{Conn, ConnQueues, NamespaceConn, NamespaceError};
use super::error::ClientError;
use super::namespace::{NamespaceHandler, NamespaceRegistry};
use crate::core::constants::{ROOT_NAMESPACE, SOCKET_IO_PATH};
use crate::core::{
    normalize_namespace, CodecError, Dialer, Header, HandlerError, Packet, PacketDecoder,
    PacketEncoder, PacketType,
};

/// Lifecycle state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none pending.
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// A generation is running.
    Connected,
    /// The last generation failed; a reconnect may follow.
    Faulted,
    /// Waiting out a backoff delay.
    Reconnecting,
}

const REASON_CLIENT_CLOSE: &str = "io client disconnect";
const REASON_SERVER_CLOSE: &str = "io server disconnect";
const REASON_TRANSPORT_ERROR: &str = "transport error";
const REASON_TRANSPORT_CLOSE: &str = "transport close";
const REASON_HANDLER_ERROR: &str = "handler error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Caller invoked `reconnect` or `close`.
    Explicit,
    /// A generation ended on its own.
    Teardown,
}

struct ReconnectRequest {
    origin: Origin,
    reply: Option<oneshot::Sender<Result<(), ClientError>>>,
}

impl ReconnectRequest {
    fn teardown() -> Self {
        Self {
            origin: Origin::Teardown,
            reply: None,
        }
    }

    fn respond(self, result: Result<(), ClientError>) {
        if let Some(reply) = self.reply {
            let _ = reply.send(result);
        }
    }
}

/// What the read task does after dispatching a packet.
enum Flow {
    Continue,
    Stop(&'static str),
}

/// Socket client bound to one server address and namespace.
///
/// Cloning is cheap; clones drive the same connection.
pub struct Client<D: Dialer> {
    inner: Arc<Inner<D>>,
}

impl<D: Dialer> Clone for Client<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<D: Dialer> {
    url: String,
    namespace: String,
    dialer: D,
    config: ClientConfig,
    handlers: NamespaceRegistry,
    active: RwLock<Option<Arc<Conn>>>,
    backoff: Mutex<BackoffPolicy>,
    state: Mutex<ConnectionState>,
    generation: AtomicU64,
    reconnecting: AtomicBool,
    shut_down: AtomicBool,
    connect_lock: tokio::sync::Mutex<()>,
    requests: mpsc::UnboundedSender<ReconnectRequest>,
    supervisor: Mutex<Option<mpsc::UnboundedReceiver<ReconnectRequest>>>,
}

impl<D: Dialer> Client<D> {
    /// Create a client for `addr`.
    ///
    /// The URL path selects the namespace (`/` is the root) and is rewritten
    /// to the socket endpoint. Nothing is dialed until [`connect`](Self::connect).
    pub fn new(addr: &str, dialer: D, config: ClientConfig) -> Result<Self, ClientError> {
        if addr.is_empty() {
            return Err(ClientError::EmptyAddress);
        }
        let (url, namespace) = endpoint(addr)?;
        let (requests, requests_rx) = mpsc::unbounded_channel();

        let inner = Inner {
            url,
            namespace,
            dialer,
            backoff: Mutex::new(config.backoff()),
            config,
            handlers: NamespaceRegistry::new(),
            active: RwLock::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            generation: AtomicU64::new(0),
            reconnecting: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            connect_lock: tokio::sync::Mutex::new(()),
            requests,
            supervisor: Mutex::new(Some(requests_rx)),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Endpoint URL the dialer receives.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Namespace this client joins (root is `""`).
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether a generation is running.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Backoff attempts made since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.backoff.lock().attempts()
    }

    /// Namespace handler registry.
    pub fn handlers(&self) -> &NamespaceRegistry {
        &self.inner.handlers
    }

    /// Dial the server and start a new connection generation.
    ///
    /// Replaces any running generation. Clears a previous [`shutdown`](Self::shutdown).
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.shut_down.store(false, Ordering::Release);
        self.inner.connect().await
    }

    /// Wait out the next backoff delay and make one connection attempt.
    ///
    /// Returns immediately when an attempt is already in flight. Fails with
    /// [`ClientError::ReconnectExhausted`] without waiting or dialing once
    /// the attempt budget is spent; the budget starts over afterwards.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        if self.inner.reconnecting.load(Ordering::Acquire) {
            debug!("reconnect already in flight");
            return Ok(());
        }
        let (reply, response) = oneshot::channel();
        self.inner.submit(ReconnectRequest {
            origin: Origin::Explicit,
            reply: Some(reply),
        });
        response.await.unwrap_or(Err(ClientError::Shutdown))
    }

    /// Close the connection.
    ///
    /// With reconnection enabled this restarts the backoff and reconnects
    /// instead of tearing down; use [`shutdown`](Self::shutdown) to stop for good.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.inner.config.reconnection && !self.inner.shut_down.load(Ordering::Acquire) {
            self.inner.backoff.lock().reset();
            return self.reconnect().await;
        }
        self.shutdown().await;
        Ok(())
    }

    /// Stop the running generation and disable reconnection until the next
    /// [`connect`](Self::connect).
    ///
    /// Returns once the generation's tasks have exited and the transport is
    /// closed.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        // A dial in flight either sees the flag or installs its generation
        // before the lock is released, so the take below retires it.
        let _guard = self.inner.connect_lock.lock().await;
        let conn = self.inner.active.write().take();
        if let Some(conn) = conn {
            self.inner.finish_generation(&conn, REASON_CLIENT_CLOSE);
            for task in conn.take_tasks() {
                if let Err(e) = task.await {
                    warn!(error = %e, "connection task failed");
                }
            }
        }
        self.inner.set_state(ConnectionState::Disconnected);
        info!(url = %self.inner.url, "client shut down");
    }

    /// Emit `event` on the client namespace.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), ClientError> {
        self.namespace_conn()?.emit(event, args).await
    }

    /// Emit `event` and run `ack` with the server's acknowledgement.
    pub async fn emit_with_ack<F>(
        &self,
        event: &str,
        args: Vec<Value>,
        ack: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        self.namespace_conn()?.emit_with_ack(event, args, ack).await
    }

    /// Register the connect handler of the client namespace.
    pub fn on_connect<F>(&self, f: F)
    where
        F: Fn(&NamespaceConn) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.namespace_handler().on_connect(f);
    }

    /// Register the disconnect handler of the client namespace.
    ///
    /// Reconnection does not depend on this handler.
    pub fn on_disconnect<F>(&self, f: F)
    where
        F: Fn(&NamespaceConn, &str) + Send + Sync + 'static,
    {
        self.namespace_handler().on_disconnect(f);
    }

    /// Register the error handler of the client namespace.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(Option<&NamespaceConn>, &ClientError) + Send + Sync + 'static,
    {
        self.namespace_handler().on_error(f);
    }

    /// Register the handler for `event` on the client namespace.
    pub fn on_event<F>(&self, event: impl Into<String>, f: F)
    where
        F: Fn(&NamespaceConn, Vec<Value>) -> Result<Vec<Value>, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.namespace_handler().on_event(event, f);
    }

    fn namespace_handler(&self) -> Arc<NamespaceHandler> {
        self.inner.handlers.get_or_create(&self.inner.namespace)
    }

    fn namespace_conn(&self) -> Result<Arc<NamespaceConn>, ClientError> {
        let conn = self
            .inner
            .active
            .read()
            .clone()
            .ok_or(ClientError::NotConnected)?;
        conn.namespace(&self.inner.namespace)
            .ok_or_else(|| ClientError::UnknownNamespace(self.inner.namespace.clone()))
    }
}

impl<D: Dialer> fmt::Debug for Client<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.url)
            .field("namespace", &self.inner.namespace)
            .field("state", &self.state())
            .finish()
    }
}

impl<D: Dialer> Inner<D> {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let _guard = self.connect_lock.lock().await;
        self.set_state(ConnectionState::Connecting);

        let (mut encoder, decoder) =
            match self.dialer.dial(&self.url, &self.config.transports).await {
                Ok(pair) => pair,
                Err(e) => return Err(self.connect_failed(e.into())),
            };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (conn, queues) = Conn::new(generation, self.config.outgoing_capacity);
        self.handlers.get_or_create(&self.namespace);
        conn.join(&self.namespace);

        let header = Header::new(PacketType::Connect, self.namespace.as_str());
        if let Err(e) = encoder.encode(&header, &[]).await {
            conn.close();
            if let Err(close_err) = encoder.close().await {
                debug!(error = %close_err, "closing transport after failed connect");
            }
            return Err(self.connect_failed(e.into()));
        }

        if self.shut_down.load(Ordering::Acquire) {
            conn.close();
            if let Err(close_err) = encoder.close().await {
                debug!(error = %close_err, "closing transport after shutdown");
            }
            self.set_state(ConnectionState::Disconnected);
            debug!(generation, "shut down while dialing");
            return Err(ClientError::Shutdown);
        }

        let previous = self.active.write().replace(Arc::clone(&conn));
        if let Some(previous) = previous {
            debug!(generation = previous.generation(), "retiring previous connection");
            self.finish_generation(&previous, REASON_CLIENT_CLOSE);
        }

        // Before spawning: a generation that dies at once owns the final state.
        self.set_state(ConnectionState::Connected);
        self.spawn_tasks(&conn, queues, encoder, decoder);
        info!(generation, url = %self.url, namespace = %self.namespace, "connected");
        Ok(())
    }

    fn connect_failed(&self, err: ClientError) -> ClientError {
        warn!(url = %self.url, error = %err, "connect failed");
        self.set_state(ConnectionState::Faulted);
        if let Some(root) = self.handlers.get(ROOT_NAMESPACE) {
            root.dispatch_error(None, &err);
        }
        err
    }

    fn spawn_tasks(
        self: &Arc<Self>,
        conn: &Arc<Conn>,
        queues: ConnQueues,
        encoder: D::Encoder,
        decoder: D::Decoder,
    ) {
        let ConnQueues { outgoing, errors } = queues;

        conn.track(tokio::spawn(error_loop(
            Arc::clone(self),
            Arc::clone(conn),
            errors,
        )));
        conn.track(tokio::spawn(write_loop(
            Arc::clone(self),
            Arc::clone(conn),
            encoder,
            outgoing,
        )));
        conn.track(tokio::spawn(read_loop(
            Arc::clone(self),
            Arc::clone(conn),
            decoder,
        )));
    }

    /// Stop `conn` and notify its namespaces. Returns `false` if it was
    /// already stopped.
    fn finish_generation(&self, conn: &Conn, reason: &str) -> bool {
        if !conn.close() {
            return false;
        }
        for ns in conn.drain_namespaces() {
            if let Some(handler) = self.handlers.get(ns.namespace()) {
                handler.dispatch_disconnect(&ns, reason);
            }
        }
        info!(generation = conn.generation(), reason, "connection closed");
        true
    }

    /// Called by a task when its generation can no longer run.
    fn end_generation(self: &Arc<Self>, conn: &Arc<Conn>, reason: &'static str) {
        if !self.finish_generation(conn, reason) {
            return;
        }
        let was_active = {
            let mut active = self.active.write();
            let matches = active
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, conn));
            if matches {
                *active = None;
            }
            matches
        };
        if !was_active {
            return;
        }

        if self.config.reconnection && !self.shut_down.load(Ordering::Acquire) {
            self.set_state(ConnectionState::Faulted);
            self.submit(ReconnectRequest::teardown());
        } else {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn submit(self: &Arc<Self>, request: ReconnectRequest) {
        if let Some(requests) = self.supervisor.lock().take() {
            tokio::spawn(supervise(Arc::downgrade(self), requests));
        }
        if let Err(mpsc::error::SendError(request)) = self.requests.send(request) {
            request.respond(Err(ClientError::Shutdown));
        }
    }

    /// One backoff step followed by one connect attempt.
    async fn reconnect_once(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ClientError::Shutdown);
        }

        let delay = {
            let mut backoff = self.backoff.lock();
            let attempts = backoff.attempts();
            if self.config.reconnection_attempts.is_exhausted(attempts) {
                backoff.reset();
                drop(backoff);
                warn!(attempts, "reconnect attempts exhausted");
                self.set_state(ConnectionState::Disconnected);
                return Err(ClientError::ReconnectExhausted { attempts });
            }
            backoff.next_delay()
        };

        self.set_state(ConnectionState::Reconnecting);
        info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        tokio::time::sleep(delay).await;

        if self.shut_down.load(Ordering::Acquire) {
            self.set_state(ConnectionState::Disconnected);
            return Err(ClientError::Shutdown);
        }

        match self.connect().await {
            Ok(()) => {
                self.backoff.lock().reset();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "reconnect attempt failed");
                Err(e)
            }
        }
    }

    fn relay_error(&self, conn: &Conn, reported: NamespaceError) {
        let NamespaceError { namespace, error } = reported;
        error!(generation = conn.generation(), namespace = %namespace, error = %error, "namespace error");

        let handled = match self.handlers.get(&namespace) {
            Some(handler) => {
                let ns = conn.namespace(&namespace);
                handler.dispatch_error(ns.as_deref(), &error)
            }
            None => false,
        };
        if !handled {
            warn!(namespace = %namespace, error = %error, "unhandled namespace error dropped");
        }
    }

    async fn dispatch(
        &self,
        conn: &Conn,
        header: Header,
        event: Option<String>,
        args: Vec<Value>,
    ) -> Result<Flow, ClientError> {
        let namespace = header.namespace.as_str();
        trace!(packet_type = ?header.packet_type, namespace, "dispatching packet");

        match header.packet_type {
            PacketType::Ack => {
                let Some(ns) = conn.namespace(namespace) else {
                    return Ok(Flow::Continue);
                };
                let Some(id) = header.id else {
                    return Err(CodecError::Decode("ack packet without id".into()).into());
                };
                match ns.take_ack(id) {
                    Some(callback) => callback(args),
                    None => conn.report(namespace, ClientError::UnknownAck(id)),
                }
            }
            PacketType::Connect => {
                let Some(handler) = self.handlers.get(namespace) else {
                    debug!(namespace, "connect for unregistered namespace ignored");
                    return Ok(Flow::Continue);
                };
                let ns = conn.join(namespace);
                handler
                    .dispatch_connect(&ns)
                    .map_err(ClientError::Handler)?;
            }
            PacketType::Disconnect => {
                if let Some(ns) = conn.leave(namespace) {
                    if let Some(handler) = self.handlers.get(namespace) {
                        handler.dispatch_disconnect(&ns, REASON_SERVER_CLOSE);
                    }
                }
                if header.is_root() || namespace == self.namespace {
                    return Ok(Flow::Stop(REASON_SERVER_CLOSE));
                }
            }
            PacketType::Event => {
                let Some(event) = event else {
                    return Err(CodecError::Decode("event packet without name".into()).into());
                };
                let (Some(ns), Some(handler)) =
                    (conn.namespace(namespace), self.handlers.get(namespace))
                else {
                    debug!(namespace, event = %event, "event for unjoined namespace ignored");
                    return Ok(Flow::Continue);
                };
                match handler.dispatch_event(&ns, &event, args) {
                    None => debug!(namespace, event = %event, "no handler for event"),
                    Some(Ok(reply)) => {
                        if let Some(id) = header.id {
                            ns.send(Packet::ack(namespace, id, reply)).await?;
                        }
                    }
                    Some(Err(e)) => return Err(ClientError::Handler(e)),
                }
            }
            PacketType::ConnectError => {
                let message = args
                    .first()
                    .map(|value| match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default();
                conn.report(namespace, ClientError::ConnectRefused(message));
            }
        }
        Ok(Flow::Continue)
    }
}

/// Derive the dial URL and client namespace from `addr`.
fn endpoint(addr: &str) -> Result<(String, String), ClientError> {
    let mut url = Url::parse(addr)?;
    let trimmed = url.path().trim_end_matches('/');
    let namespace = normalize_namespace(trimmed).to_owned();
    let path = if namespace.is_empty() {
        format!("{SOCKET_IO_PATH}/")
    } else {
        format!("{SOCKET_IO_PATH}{namespace}")
    };
    url.set_path(&path);
    Ok((url.into(), namespace))
}

async fn read_packet<R: PacketDecoder>(
    decoder: &mut R,
) -> Result<(Header, Option<String>, Vec<Value>), CodecError> {
    let (mut header, event) = decoder.decode_header().await?;
    let normalized = normalize_namespace(&header.namespace);
    if normalized.len() != header.namespace.len() {
        header.namespace = normalized.to_owned();
    }
    let args = decoder.decode_args().await?;
    Ok((header, event, args))
}

async fn read_loop<D: Dialer>(inner: Arc<Inner<D>>, conn: Arc<Conn>, mut decoder: D::Decoder) {
    let reason = loop {
        let decoded = tokio::select! {
            biased;
            _ = conn.quit().wait() => break REASON_CLIENT_CLOSE,
            decoded = read_packet(&mut decoder) => decoded,
        };

        let (header, event, args) = match decoded {
            Ok(packet) => packet,
            Err(e) => {
                let reason = match e {
                    CodecError::Closed => REASON_TRANSPORT_CLOSE,
                    _ => REASON_TRANSPORT_ERROR,
                };
                error!(generation = conn.generation(), error = %e, "decode failed");
                conn.report(ROOT_NAMESPACE, e.into());
                break reason;
            }
        };

        let namespace = header.namespace.clone();
        match inner.dispatch(&conn, header, event, args).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop(reason)) => break reason,
            Err(e) => {
                error!(generation = conn.generation(), namespace = %namespace, error = %e, "dispatch failed");
                conn.report(&namespace, e);
                break REASON_HANDLER_ERROR;
            }
        }
    };

    debug!(generation = conn.generation(), reason, "read task stopped");
    inner.end_generation(&conn, reason);
}

async fn write_loop<D: Dialer>(
    inner: Arc<Inner<D>>,
    conn: Arc<Conn>,
    mut encoder: D::Encoder,
    mut outgoing: mpsc::Receiver<Packet>,
) {
    let reason = loop {
        let packet = tokio::select! {
            biased;
            _ = conn.quit().wait() => break REASON_CLIENT_CLOSE,
            packet = outgoing.recv() => match packet {
                Some(packet) => packet,
                None => break REASON_CLIENT_CLOSE,
            },
        };

        if let Err(e) = encoder.encode(&packet.header, &packet.args).await {
            let fatal = e.is_fatal();
            warn!(generation = conn.generation(), namespace = %packet.header.namespace, error = %e, fatal, "encode failed");
            conn.report(&packet.header.namespace, e.into());
            if fatal {
                break REASON_TRANSPORT_ERROR;
            }
        }
    };

    if let Err(e) = encoder.close().await {
        debug!(generation = conn.generation(), error = %e, "closing transport");
    }
    debug!(generation = conn.generation(), reason, "write task stopped");
    inner.end_generation(&conn, reason);
}

async fn error_loop<D: Dialer>(
    inner: Arc<Inner<D>>,
    conn: Arc<Conn>,
    mut errors: mpsc::UnboundedReceiver<NamespaceError>,
) {
    loop {
        tokio::select! {
            biased;
            Some(reported) = errors.recv() => inner.relay_error(&conn, reported),
            _ = conn.quit().wait() => break,
        }
    }
    // Errors raised by the failure that stopped the generation.
    while let Ok(reported) = errors.try_recv() {
        inner.relay_error(&conn, reported);
    }
    debug!(generation = conn.generation(), "error task stopped");
}

/// Owns the backoff. Serves reconnect requests one at a time.
async fn supervise<D: Dialer>(
    inner: Weak<Inner<D>>,
    mut requests: mpsc::UnboundedReceiver<ReconnectRequest>,
) {
    while let Some(request) = requests.recv().await {
        let Some(inner) = inner.upgrade() else {
            request.respond(Err(ClientError::Shutdown));
            break;
        };

        inner.reconnecting.store(true, Ordering::Release);
        let result = inner.reconnect_once().await;
        inner.reconnecting.store(false, Ordering::Release);

        // Requests that arrived during the attempt were no-ops.
        while let Ok(extra) = requests.try_recv() {
            extra.respond(Ok(()));
        }

        if request.origin == Origin::Teardown {
            if let Err(e) = &result {
                if e.is_retryable()
                    && inner.config.reconnection
                    && !inner.shut_down.load(Ordering::Acquire)
                    && inner.active.read().is_none()
                {
                    inner.submit(ReconnectRequest::teardown());
                } else if let Some(root) = inner.handlers.get(ROOT_NAMESPACE) {
                    root.dispatch_error(None, e);
                }
            }
        }
        request.respond(result);
    }
}
