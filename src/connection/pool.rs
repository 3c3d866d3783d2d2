//! Connection pool
//!
//! Drivers are checked out exclusively and checked back in with
//! [`ConnectionPool::release`]. A driver is created, connected and
//! confirmed on first demand for its `(address, role)` key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::address::ProxyAddress;
use crate::error::Result;
use crate::transport::SocketFactory;

use super::driver::{ConnectionDriver, Role};
use super::setup::ConnectionSetup;

type PoolKey = (ProxyAddress, Role);

/// Idle connection drivers keyed by proxy address and role
#[derive(Debug)]
pub struct ConnectionPool {
    factory: SocketFactory,
    setup: ConnectionSetup,
    idle: Mutex<HashMap<PoolKey, Vec<ConnectionDriver>>>,
}

impl ConnectionPool {
    pub fn new(factory: SocketFactory, setup: ConnectionSetup) -> Self {
        Self {
            factory,
            setup,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn setup(&self) -> &ConnectionSetup {
        &self.setup
    }

    pub fn factory(&self) -> &SocketFactory {
        &self.factory
    }

    fn take_idle(&self, key: &PoolKey) -> Option<ConnectionDriver> {
        let mut idle = match self.idle.lock() {
            Ok(idle) => idle,
            Err(poisoned) => poisoned.into_inner(),
        };
        let drivers = idle.get_mut(key)?;
        let driver = drivers.pop();
        if drivers.is_empty() {
            idle.remove(key);
        }
        driver
    }

    /// Check out a driver, creating and confirming one if none is idle.
    ///
    /// A driver that fails its connection check is closed before the error
    /// propagates.
    pub async fn get_connection(
        &self,
        address: ProxyAddress,
        role: Role,
    ) -> Result<ConnectionDriver> {
        if let Some(driver) = self.take_idle(&(address, role)) {
            return Ok(driver);
        }

        let mut driver =
            ConnectionDriver::new(self.factory.clone(), address, role, self.setup.clone());
        driver.connect()?;

        if self.setup.check_connection {
            if let Err(e) = driver.check_connection(self.setup.connection_timeout).await {
                tracing::warn!(address = %address, role = %role, error = %e, "Connection check failed");
                driver.close(Duration::ZERO).await;
                return Err(e);
            }
        }

        tracing::debug!(address = %address, role = %role, "New pooled connection");
        Ok(driver)
    }

    /// Return a driver for reuse
    pub fn release(&self, driver: ConnectionDriver) {
        let key = (driver.address(), driver.role());
        let mut idle = match self.idle.lock() {
            Ok(idle) => idle,
            Err(poisoned) => poisoned.into_inner(),
        };
        idle.entry(key).or_default().push(driver);
    }

    /// Close a driver instead of returning it
    pub async fn destroy(&self, driver: ConnectionDriver) {
        tracing::debug!(address = %driver.address(), role = %driver.role(), "Destroying connection");
        driver.close(Duration::ZERO).await;
    }

    /// Number of idle drivers
    pub fn idle_count(&self) -> usize {
        match self.idle.lock() {
            Ok(idle) => idle.values().map(Vec::len).sum(),
            Err(poisoned) => poisoned.into_inner().values().map(Vec::len).sum(),
        }
    }

    /// Close every idle driver
    pub async fn close(&self, linger: Duration) {
        let drained: Vec<ConnectionDriver> = {
            let mut idle = match self.idle.lock() {
                Ok(idle) => idle,
                Err(poisoned) => poisoned.into_inner(),
            };
            idle.drain().flat_map(|(_, drivers)| drivers).collect()
        };
        for driver in drained {
            driver.close(linger).await;
        }
    }
}
