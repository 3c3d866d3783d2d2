//! Actor configuration

use std::time::Duration;

use crate::address::{ProxyAddress, RegAddress};
use crate::connection::ConnectionSetup;
use crate::registration::DEFAULT_REQUEST_TIMEOUT;

/// Default number of callbacks running at once
pub const DEFAULT_POOL_SIZE: usize = 2;

/// Actor configuration options
#[derive(Debug, Clone)]
pub struct ActorConfig {
    /// Proxy used when no address is given
    pub proxy: ProxyAddress,

    /// Registrar used when no address is given
    pub registrar: RegAddress,

    /// Callbacks running at once across all subscriptions.
    /// A size of 1 delivers messages to callbacks in order.
    pub pool_size: usize,

    /// Connection and subscription confirmation
    pub setup: ConnectionSetup,

    /// Registrar reply timeout
    pub registrar_timeout: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyAddress::localhost(),
            registrar: RegAddress::localhost(),
            pool_size: DEFAULT_POOL_SIZE,
            setup: ConnectionSetup::default(),
            registrar_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ActorConfig {
    pub fn new(proxy: ProxyAddress, registrar: RegAddress) -> Self {
        Self {
            proxy,
            registrar,
            ..Default::default()
        }
    }

    /// Set the callback pool size (at least 1)
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Deliver callbacks one at a time, in order
    pub fn single_threaded(self) -> Self {
        self.pool_size(1)
    }

    pub fn setup(mut self, setup: ConnectionSetup) -> Self {
        self.setup = setup;
        self
    }

    pub fn registrar_timeout(mut self, timeout: Duration) -> Self {
        self.registrar_timeout = timeout;
        self
    }
}
