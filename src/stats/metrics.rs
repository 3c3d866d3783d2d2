//! Statistics for the relay and for subscriptions
//!
//! Plain counters. The owning component keeps them behind its own mutex
//! and hands out copies.

use std::time::{Duration, Instant};

/// Forwarding device statistics
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// When the relay started
    pub started_at: Instant,
    /// Messages accepted from publishers
    pub messages_received: u64,
    /// Message copies written to subscribers
    pub messages_forwarded: u64,
    /// Payload bytes accepted from publishers
    pub bytes_received: u64,
    /// Publisher connections currently open
    pub publishers: u64,
    /// Subscriber connections currently open
    pub subscribers: u64,
    /// Subscribe commands seen
    pub subscribes: u64,
    /// Unsubscribe commands seen
    pub unsubscribes: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            messages_received: 0,
            messages_forwarded: 0,
            bytes_received: 0,
            publishers: 0,
            subscribers: 0,
            subscribes: 0,
            unsubscribes: 0,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average inbound message rate since start
    pub fn message_rate(&self) -> f64 {
        let secs = self.uptime().as_secs_f64();
        if secs > 0.0 {
            self.messages_received as f64 / secs
        } else {
            0.0
        }
    }

    pub(crate) fn record_message(&mut self, frames: &[bytes::Bytes], copies: usize) {
        self.messages_received += 1;
        self.messages_forwarded += copies as u64;
        self.bytes_received += frames.iter().map(|f| f.len() as u64).sum::<u64>();
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-subscription dispatch statistics
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStats {
    /// Frames read from the socket
    pub received: u64,
    /// Messages handed to the callback
    pub dispatched: u64,
    /// Two-frame control echoes dropped
    pub control_skipped: u64,
    /// Messages that could not be decoded
    pub decode_failures: u64,
    /// Callback invocations that panicked
    pub callback_failures: u64,
}

impl SubscriptionStats {
    pub fn new() -> Self {
        Self::default()
    }
}
