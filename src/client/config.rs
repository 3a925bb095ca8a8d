//! Client configuration.

use std::time::Duration;

use super::backoff::{BackoffPolicy, MaxAttempts};
use crate::core::TransportKind;
use crate::core::constants::{
    DEFAULT_OUTGOING_CAPACITY, DEFAULT_RANDOMIZATION_FACTOR, DEFAULT_RECONNECTION_DELAY,
    DEFAULT_RECONNECTION_DELAY_MAX, DEFAULT_RECONNECTION_FACTOR,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transports to dial, in preference order.
    pub transports: Vec<TransportKind>,

    /// Reconnect automatically after a connection is lost.
    pub reconnection: bool,

    /// First reconnection delay.
    pub reconnection_delay: Duration,

    /// Ceiling for reconnection delays.
    pub reconnection_delay_max: Duration,

    /// Growth multiplier between reconnection delays.
    pub reconnection_factor: f64,

    /// Jitter fraction in `[0, 1]` applied to reconnection delays.
    pub randomization_factor: f64,

    /// Attempts allowed before reconnection gives up.
    pub reconnection_attempts: MaxAttempts,

    /// Capacity of the outgoing packet queue.
    pub outgoing_capacity: usize,
}

impl ClientConfig {
    /// Backoff policy described by this configuration.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.reconnection_delay,
            self.reconnection_delay_max,
            self.reconnection_factor,
            self.randomization_factor,
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transports: vec![TransportKind::Polling, TransportKind::WebSocket],
            reconnection: true,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            reconnection_delay_max: DEFAULT_RECONNECTION_DELAY_MAX,
            reconnection_factor: DEFAULT_RECONNECTION_FACTOR,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            reconnection_attempts: MaxAttempts::Unbounded,
            outgoing_capacity: DEFAULT_OUTGOING_CAPACITY,
        }
    }
}

/// Builder for creating a [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the transport preference list. An empty list keeps the default.
    pub fn transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        let transports: Vec<_> = transports.into_iter().collect();
        if !transports.is_empty() {
            self.config.transports = transports;
        }
        self
    }

    /// Enable or disable automatic reconnection.
    pub fn reconnection(mut self, enabled: bool) -> Self {
        self.config.reconnection = enabled;
        self
    }

    /// Set the first reconnection delay.
    pub fn reconnection_delay(mut self, delay: Duration) -> Self {
        self.config.reconnection_delay = delay;
        self
    }

    /// Set the reconnection delay ceiling.
    pub fn reconnection_delay_max(mut self, delay: Duration) -> Self {
        self.config.reconnection_delay_max = delay;
        self
    }

    /// Set the growth multiplier.
    pub fn reconnection_factor(mut self, factor: f64) -> Self {
        self.config.reconnection_factor = factor;
        self
    }

    /// Set the jitter fraction.
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.config.randomization_factor = factor;
        self
    }

    /// Bound the number of reconnection attempts.
    pub fn reconnection_attempts(mut self, attempts: MaxAttempts) -> Self {
        self.config.reconnection_attempts = attempts;
        self
    }

    /// Set the outgoing queue capacity (at least 1).
    pub fn outgoing_capacity(mut self, capacity: usize) -> Self {
        self.config.outgoing_capacity = capacity.max(1);
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
