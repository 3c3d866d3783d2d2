//! Transport context
//!
//! Owns the process-wide pieces every socket shares: the root
//! cancellation token and the socket budget. It is created by the top-level
//! wiring and passed to every component explicitly.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Default maximum number of live sockets per context
pub const DEFAULT_MAX_SOCKETS: usize = 1024;

/// Shared transport context (cheap to clone)
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    shutdown: CancellationToken,
    sockets: Arc<Semaphore>,
    max_sockets: usize,
}

impl Context {
    /// Create a context with the default socket budget
    pub fn new() -> Self {
        Self::with_max_sockets(DEFAULT_MAX_SOCKETS)
    }

    /// Create a context allowing at most `max_sockets` live sockets
    pub fn with_max_sockets(max_sockets: usize) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                shutdown: CancellationToken::new(),
                sockets: Arc::new(Semaphore::new(max_sockets)),
                max_sockets,
            }),
        }
    }

    /// Terminate the context: every socket and loop created from it stops
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            tracing::debug!("Context shutdown requested");
        }
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Token cancelled when this context shuts down or the returned token
    /// itself is cancelled
    pub fn child_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    pub fn max_sockets(&self) -> usize {
        self.inner.max_sockets
    }

    /// Number of sockets currently alive
    pub fn open_sockets(&self) -> usize {
        self.inner.max_sockets - self.inner.sockets.available_permits()
    }

    /// Reserve a socket slot; released when the permit is dropped
    pub(crate) fn acquire_socket(&self) -> Result<OwnedSemaphorePermit> {
        if self.is_shut_down() {
            return Err(Error::Closed);
        }
        self.inner
            .sockets
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::SocketLimit {
                max: self.inner.max_sockets,
            })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
