//! Per-generation connection state.
//!
//! A [`Conn`] is created for every successful dial and dies with it. It owns
//! the outgoing packet queue, the error queue and the quit signal shared by
//! the generation's read, write and error tasks, plus the namespaces joined
//! on it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::ClientError;
use crate::core::Packet;
use crate::transport::Shutdown;

/// Callback run with the arguments of an acknowledgement.
pub type AckCallback = Box<dyn FnOnce(Vec<Value>) + Send>;

/// Error raised inside a generation, tagged with the namespace it concerns.
#[derive(Debug)]
pub(crate) struct NamespaceError {
    pub namespace: String,
    pub error: ClientError,
}

/// Receiving ends of a generation's queues, handed to its tasks.
pub(crate) struct ConnQueues {
    pub outgoing: mpsc::Receiver<Packet>,
    pub errors: mpsc::UnboundedReceiver<NamespaceError>,
}

/// One connection generation.
pub(crate) struct Conn {
    generation: u64,
    outgoing: mpsc::Sender<Packet>,
    errors: mpsc::UnboundedSender<NamespaceError>,
    quit: Shutdown,
    namespaces: RwLock<HashMap<String, Arc<NamespaceConn>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Conn {
    pub fn new(generation: u64, capacity: usize) -> (Arc<Self>, ConnQueues) {
        let (outgoing, outgoing_rx) = mpsc::channel(capacity.max(1));
        let (errors, errors_rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            generation,
            outgoing,
            errors,
            quit: Shutdown::new(),
            namespaces: RwLock::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        });
        let queues = ConnQueues {
            outgoing: outgoing_rx,
            errors: errors_rx,
        };
        (conn, queues)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Join `namespace`, returning the existing entry if already joined.
    pub fn join(&self, namespace: &str) -> Arc<NamespaceConn> {
        let mut namespaces = self.namespaces.write();
        Arc::clone(namespaces.entry(namespace.to_owned()).or_insert_with(|| {
            Arc::new(NamespaceConn::new(
                namespace,
                self.generation,
                self.outgoing.clone(),
            ))
        }))
    }

    pub fn namespace(&self, namespace: &str) -> Option<Arc<NamespaceConn>> {
        self.namespaces.read().get(namespace).cloned()
    }

    pub fn leave(&self, namespace: &str) -> Option<Arc<NamespaceConn>> {
        self.namespaces.write().remove(namespace)
    }

    /// Remove and return every joined namespace.
    pub fn drain_namespaces(&self) -> Vec<Arc<NamespaceConn>> {
        self.namespaces.write().drain().map(|(_, ns)| ns).collect()
    }

    /// Queue `error` for the error task. Dropped once the generation is gone.
    pub fn report(&self, namespace: &str, error: ClientError) {
        let _ = self.errors.send(NamespaceError {
            namespace: namespace.to_owned(),
            error,
        });
    }

    pub fn quit(&self) -> &Shutdown {
        &self.quit
    }

    /// Signal the generation's tasks to stop.
    ///
    /// Returns `true` only for the first caller.
    pub fn close(&self) -> bool {
        self.quit.fire()
    }

    pub fn is_closed(&self) -> bool {
        self.quit.is_fired()
    }

    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    pub fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .field("namespaces", &self.namespaces.read().len())
            .finish()
    }
}

/// A namespace joined on one connection generation.
///
/// Handlers receive this to emit replies on the same connection.
pub struct NamespaceConn {
    namespace: String,
    generation: u64,
    outgoing: mpsc::Sender<Packet>,
    next_ack_id: AtomicU64,
    acks: Mutex<HashMap<u64, AckCallback>>,
}

impl NamespaceConn {
    fn new(namespace: &str, generation: u64, outgoing: mpsc::Sender<Packet>) -> Self {
        Self {
            namespace: namespace.to_owned(),
            generation,
            outgoing,
            next_ack_id: AtomicU64::new(0),
            acks: Mutex::new(HashMap::new()),
        }
    }

    /// Namespace name (root is `""`).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Connection generation this namespace was joined on.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event for the write task.
    ///
    /// Waits while the outgoing queue is full.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), ClientError> {
        self.send(Packet::event(self.namespace.as_str(), event, args))
            .await
    }

    /// Queue an event and run `ack` with the server's acknowledgement.
    pub async fn emit_with_ack<F>(
        &self,
        event: &str,
        args: Vec<Value>,
        ack: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        let id = self.next_ack_id.fetch_add(1, Ordering::Relaxed);
        self.acks.lock().insert(id, Box::new(ack));

        let mut packet = Packet::event(self.namespace.as_str(), event, args);
        packet.header.id = Some(id);
        let result = self.send(packet).await;
        if result.is_err() {
            self.acks.lock().remove(&id);
        }
        result
    }

    /// Number of acknowledgements still awaited.
    pub fn pending_acks(&self) -> usize {
        self.acks.lock().len()
    }

    pub(crate) async fn send(&self, packet: Packet) -> Result<(), ClientError> {
        self.outgoing
            .send(packet)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    pub(crate) fn take_ack(&self, id: u64) -> Option<AckCallback> {
        self.acks.lock().remove(&id)
    }
}

impl fmt::Debug for NamespaceConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceConn")
            .field("namespace", &self.namespace)
            .field("generation", &self.generation)
            .field("pending_acks", &self.pending_acks())
            .finish()
    }
}
