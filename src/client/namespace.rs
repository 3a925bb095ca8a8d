//! Namespace handler sets.
//!
//! A [`NamespaceRegistry`] maps namespace names to the handlers registered
//! for them. It outlives every connection generation; the per-generation
//! joined namespaces live on the connection itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::connection::NamespaceConn;
use super::error::ClientError;
use crate::core::HandlerError;

/// Called when the server confirms a namespace join.
pub type ConnectHandler = Arc<dyn Fn(&NamespaceConn) -> Result<(), HandlerError> + Send + Sync>;

/// Called once when a joined namespace goes away, with the reason.
pub type DisconnectHandler = Arc<dyn Fn(&NamespaceConn, &str) + Send + Sync>;

/// Called with errors attributed to the namespace. The connection is absent
/// when the failure happened before the namespace was joined.
pub type ErrorHandler = Arc<dyn Fn(Option<&NamespaceConn>, &ClientError) + Send + Sync>;

/// Called with an event's arguments. The returned values answer the event
/// when the server asked for an acknowledgement.
pub type EventHandler =
    Arc<dyn Fn(&NamespaceConn, Vec<Value>) -> Result<Vec<Value>, HandlerError> + Send + Sync>;

/// Handlers registered for one namespace.
pub struct NamespaceHandler {
    namespace: String,
    on_connect: RwLock<Option<ConnectHandler>>,
    on_disconnect: RwLock<Option<DisconnectHandler>>,
    on_error: RwLock<Option<ErrorHandler>>,
    events: RwLock<HashMap<String, EventHandler>>,
}

impl NamespaceHandler {
    /// Create an empty handler set.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            on_connect: RwLock::new(None),
            on_disconnect: RwLock::new(None),
            on_error: RwLock::new(None),
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Namespace these handlers belong to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Replace the connect handler.
    pub fn on_connect<F>(&self, f: F)
    where
        F: Fn(&NamespaceConn) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        *self.on_connect.write() = Some(Arc::new(f));
    }

    /// Replace the disconnect handler.
    pub fn on_disconnect<F>(&self, f: F)
    where
        F: Fn(&NamespaceConn, &str) + Send + Sync + 'static,
    {
        *self.on_disconnect.write() = Some(Arc::new(f));
    }

    /// Replace the error handler.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(Option<&NamespaceConn>, &ClientError) + Send + Sync + 'static,
    {
        *self.on_error.write() = Some(Arc::new(f));
    }

    /// Register the handler for `event`, replacing any previous one.
    pub fn on_event<F>(&self, event: impl Into<String>, f: F)
    where
        F: Fn(&NamespaceConn, Vec<Value>) -> Result<Vec<Value>, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.events.write().insert(event.into(), Arc::new(f));
    }

    /// Whether an error handler is registered.
    pub fn has_error_handler(&self) -> bool {
        self.on_error.read().is_some()
    }

    // Handlers are cloned out of their lock before being called, so a
    // handler may re-register handlers without deadlocking.

    pub(crate) fn dispatch_connect(&self, conn: &NamespaceConn) -> Result<(), HandlerError> {
        let handler = self.on_connect.read().clone();
        match handler {
            Some(handler) => handler(conn),
            None => Ok(()),
        }
    }

    pub(crate) fn dispatch_disconnect(&self, conn: &NamespaceConn, reason: &str) {
        let handler = self.on_disconnect.read().clone();
        if let Some(handler) = handler {
            handler(conn, reason);
        }
    }

    /// Returns `false` when no error handler is registered.
    pub(crate) fn dispatch_error(&self, conn: Option<&NamespaceConn>, err: &ClientError) -> bool {
        let handler = self.on_error.read().clone();
        match handler {
            Some(handler) => {
                handler(conn, err);
                true
            }
            None => false,
        }
    }

    /// Returns `None` when no handler is registered for `event`.
    pub(crate) fn dispatch_event(
        &self,
        conn: &NamespaceConn,
        event: &str,
        args: Vec<Value>,
    ) -> Option<Result<Vec<Value>, HandlerError>> {
        let handler = self.events.read().get(event).cloned();
        handler.map(|handler| handler(conn, args))
    }
}

impl fmt::Debug for NamespaceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: Vec<String> = self.events.read().keys().cloned().collect();
        f.debug_struct("NamespaceHandler")
            .field("namespace", &self.namespace)
            .field("on_connect", &self.on_connect.read().is_some())
            .field("on_disconnect", &self.on_disconnect.read().is_some())
            .field("on_error", &self.on_error.read().is_some())
            .field("events", &events)
            .finish()
    }
}

/// Namespace name to handler set.
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    handlers: RwLock<HashMap<String, Arc<NamespaceHandler>>>,
}

impl NamespaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler set for `namespace`, if registered.
    pub fn get(&self, namespace: &str) -> Option<Arc<NamespaceHandler>> {
        self.handlers.read().get(namespace).cloned()
    }

    /// Register `handler` under `namespace`, replacing any previous set.
    pub fn set(&self, namespace: impl Into<String>, handler: Arc<NamespaceHandler>) {
        self.handlers.write().insert(namespace.into(), handler);
    }

    /// Handler set for `namespace`, created empty when missing.
    pub fn get_or_create(&self, namespace: &str) -> Arc<NamespaceHandler> {
        if let Some(handler) = self.get(namespace) {
            return handler;
        }
        let mut handlers = self.handlers.write();
        Arc::clone(
            handlers
                .entry(namespace.to_owned())
                .or_insert_with(|| Arc::new(NamespaceHandler::new(namespace))),
        )
    }

    /// Visit every registered namespace. Order is unspecified.
    ///
    /// Iterates a snapshot, so `f` may modify the registry.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<NamespaceHandler>),
    {
        let snapshot: Vec<_> = self
            .handlers
            .read()
            .iter()
            .map(|(name, handler)| (name.clone(), Arc::clone(handler)))
            .collect();
        for (name, handler) in &snapshot {
            f(name, handler);
        }
    }

    /// Number of registered namespaces.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no namespace is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::connection::Conn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_registry_get_set() {
        let registry = NamespaceRegistry::new();
        assert!(registry.get("/chat").is_none());

        let handler = Arc::new(NamespaceHandler::new("/chat"));
        registry.set("/chat", Arc::clone(&handler));

        let found = registry.get("/chat").unwrap();
        assert!(Arc::ptr_eq(&found, &handler));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let registry = NamespaceRegistry::new();
        let first = registry.get_or_create("");
        let second = registry.get_or_create("");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.namespace(), "");
    }

    #[test]
    fn test_range_visits_all_and_allows_mutation() {
        let registry = NamespaceRegistry::new();
        registry.get_or_create("");
        registry.get_or_create("/a");
        registry.get_or_create("/b");

        let mut seen = Vec::new();
        registry.range(|name, _| {
            seen.push(name.to_owned());
            registry.get_or_create("/added");
        });
        seen.sort();
        assert_eq!(seen, vec!["", "/a", "/b"]);
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn test_dispatch_event() {
        let (conn, _queues) = Conn::new(1, 4);
        let ns = conn.join("");
        let handler = NamespaceHandler::new("");
        handler.on_event("sum", |_, args| {
            let total: i64 = args.iter().filter_map(Value::as_i64).sum();
            Ok(vec![Value::from(total)])
        });

        let result = handler.dispatch_event(&ns, "sum", vec![Value::from(2), Value::from(3)]);
        assert_eq!(result.unwrap().unwrap(), vec![Value::from(5)]);
        assert!(handler.dispatch_event(&ns, "missing", vec![]).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_error_reports_presence() {
        let (conn, _queues) = Conn::new(1, 4);
        let ns = conn.join("");
        let handler = NamespaceHandler::new("");
        assert!(!handler.dispatch_error(Some(&ns), &ClientError::NotConnected));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        handler.on_error(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handler.has_error_handler());
        assert!(handler.dispatch_error(None, &ClientError::NotConnected));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
