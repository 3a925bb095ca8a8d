//! Wake-up primitives shared between frame producers and the drain.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};

/// Single-slot coalescing wake-up cell.
///
/// A depth-1 queue whose `post` never blocks: posting into a full cell is
/// silently dropped. N posts before one `wait` are observed as one wakeup,
/// so consumers must act on all accumulated work, not one item per wakeup.
#[derive(Debug)]
pub struct WakeCell {
    tx: mpsc::Sender<()>,
    rx: Mutex<mpsc::Receiver<()>>,
}

impl WakeCell {
    /// Create an empty cell.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Fill the slot if empty.
    ///
    /// Returns `false` when a wakeup was already pending.
    pub fn post(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Closed(())) => false,
        }
    }

    /// Wait for a pending wakeup and consume it.
    pub async fn wait(&self) {
        let mut rx = self.rx.lock().await;
        // The sender lives as long as `self`, so `None` is unreachable.
        let _ = rx.recv().await;
    }

    /// Whether a wakeup is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        self.tx.capacity() == 0
    }
}

impl Default for WakeCell {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot broadcast signal.
///
/// Clones observe the same signal. Once fired it stays fired.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create an unfired signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal.
    ///
    /// Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_wake_cell_coalesces() {
        let cell = WakeCell::new();
        assert!(!cell.is_pending());

        assert!(cell.post());
        assert!(!cell.post());
        assert!(!cell.post());
        assert!(cell.is_pending());
    }

    #[tokio::test]
    async fn test_wake_cell_wait_consumes() {
        let cell = WakeCell::new();
        cell.post();
        cell.post();

        cell.wait().await;
        assert!(!cell.is_pending());

        // Collapsed posts leave nothing behind.
        let second = tokio::time::timeout(Duration::from_millis(20), cell.wait()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_fires_once() {
        let signal = Shutdown::new();
        let observer = signal.clone();
        assert!(!observer.is_fired());

        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(observer.is_fired());

        // Already fired: resolves immediately.
        observer.wait().await;
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiter() {
        let signal = Shutdown::new();
        let observer = signal.clone();
        let waiter = tokio::spawn(async move { observer.wait().await });

        tokio::task::yield_now().await;
        signal.fire();
        waiter.await.unwrap();
    }
}
