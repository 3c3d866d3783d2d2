//! Forwarding proxy
//!
//! Three ports per proxy:
//!
//! ```text
//!   pub_port      publishers connect here (fan-in)
//!   pub_port + 1  subscribers connect here (fan-out)
//!   pub_port + 2  handshake replies to client dealers
//! ```
//!
//! The relay is stateless with respect to payloads. The controller rides
//! on the relay to confirm that connections and subscriptions have
//! propagated before clients rely on them.

pub mod config;
pub mod control;
mod controller;
mod switch;

pub use config::ProxyConfig;
pub use control::{ControlFrame, ControlType, CTRL_TOPIC};

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::address::ProxyAddress;
use crate::error::Result;
use crate::stats::RelayStats;
use crate::transport::SocketFactory;

use controller::Controller;
use switch::Switch;

/// Proxy server
pub struct Proxy {
    factory: SocketFactory,
    config: ProxyConfig,
}

impl Proxy {
    pub fn new(factory: SocketFactory, config: ProxyConfig) -> Self {
        Self { factory, config }
    }

    pub fn address(&self) -> ProxyAddress {
        self.config.address
    }

    /// Bind all three ports and start the relay and controller tasks.
    ///
    /// Fails with `Error::AddressInUse` if any port is taken; ports bound
    /// before the failure are released.
    pub async fn start(self) -> Result<ProxyHandle> {
        let address = self.config.address;
        let frontend = self.factory.bind_listener(address.pub_endpoint()).await?;
        let backend = self.factory.bind_listener(address.sub_endpoint()).await?;
        let controller = Controller::bind(&self.factory, &address, self.config.verbose).await?;

        let cancel = self.factory.child_token();
        let switch = Switch::new(self.config.verbose);

        let relay = {
            let switch = switch.clone();
            let config = self.factory.config().clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                // Socket slots are held until the relay stops
                let _slots = (frontend.permit, backend.permit);
                switch
                    .run(frontend.listener, backend.listener, config, cancel)
                    .await;
            })
        };
        let control = tokio::spawn(controller.run(cancel.clone()));

        tracing::info!(
            address = %address,
            sub_port = address.sub_port(),
            control_port = address.control_port(),
            verbose = self.config.verbose,
            "Proxy started"
        );

        Ok(ProxyHandle {
            address,
            switch,
            cancel,
            tasks: vec![relay, control],
        })
    }

    /// Run until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.start().await?;
        shutdown.await;
        tracing::info!("Shutdown signal received");
        handle.stop().await;
        Ok(())
    }
}

/// Handle to a running proxy
#[derive(Debug)]
pub struct ProxyHandle {
    address: ProxyAddress,
    switch: Switch,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ProxyHandle {
    pub fn address(&self) -> ProxyAddress {
        self.address
    }

    /// Snapshot of the relay counters
    pub fn stats(&self) -> RelayStats {
        self.switch.stats()
    }

    /// Stop both tasks and wait for them
    pub async fn stop(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Proxy task failed");
            }
        }
        tracing::info!(address = %self.address, "Proxy stopped");
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
