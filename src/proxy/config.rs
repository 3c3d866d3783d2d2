//! Proxy configuration

use crate::address::ProxyAddress;

/// Proxy configuration options
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Publish port; the subscribe and control ports follow it
    pub address: ProxyAddress,

    /// Log subscriptions, control requests and every forwarded message
    pub verbose: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            address: ProxyAddress::localhost(),
            verbose: false,
        }
    }
}

impl ProxyConfig {
    pub fn new(address: ProxyAddress) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    /// Enable or disable verbose logging
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
