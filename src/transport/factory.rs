//! Socket factory
//!
//! Every socket is created here so that socket budgeting, TCP options and
//! error translation are applied uniformly. A failed bind releases the
//! socket slot it reserved before the error propagates.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

use super::bound::{RepSocket, RouterSocket};
use super::codec::SocketKind;
use super::context::Context;
use super::link::{DealerSocket, Link, PubSocket, ReqSocket, SubSocket};
use super::listener;

/// Transport socket options
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Delay between connection attempts of connecting sockets
    pub reconnect_interval: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(100),
            tcp_nodelay: true,
        }
    }
}

impl SocketConfig {
    /// Set the reconnect interval
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

/// Creates, binds and connects transport sockets
#[derive(Debug, Clone)]
pub struct SocketFactory {
    context: Context,
    config: SocketConfig,
}

/// A bound TCP listener together with its socket slot
#[derive(Debug)]
pub(crate) struct BoundListener {
    pub(crate) listener: TcpListener,
    pub(crate) permit: OwnedSemaphorePermit,
}

impl SocketFactory {
    pub fn new(context: Context) -> Self {
        Self::with_config(context, SocketConfig::default())
    }

    pub fn with_config(context: Context, config: SocketConfig) -> Self {
        Self { context, config }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    fn link(&self, endpoint: SocketAddr, kind: SocketKind, identity: Bytes) -> Result<Link> {
        let permit = self.context.acquire_socket()?;
        Ok(Link::spawn(
            endpoint,
            kind,
            identity,
            &self.config,
            self.context.child_token(),
            permit,
        ))
    }

    pub fn new_pub(&self, endpoint: SocketAddr) -> Result<PubSocket> {
        Ok(PubSocket::new(self.link(endpoint, SocketKind::Pub, Bytes::new())?))
    }

    pub fn new_sub(&self, endpoint: SocketAddr) -> Result<SubSocket> {
        Ok(SubSocket::new(self.link(endpoint, SocketKind::Sub, Bytes::new())?))
    }

    pub fn new_dealer(&self, endpoint: SocketAddr, identity: impl Into<Bytes>) -> Result<DealerSocket> {
        let identity = identity.into();
        let link = self.link(endpoint, SocketKind::Dealer, identity.clone())?;
        Ok(DealerSocket::new(link, identity))
    }

    pub fn new_req(&self, endpoint: SocketAddr) -> Result<ReqSocket> {
        Ok(ReqSocket::new(self.link(endpoint, SocketKind::Req, Bytes::new())?))
    }

    /// Bind a raw listener (used by the forwarding device)
    pub(crate) async fn bind_listener(&self, endpoint: SocketAddr) -> Result<BoundListener> {
        let permit = self.context.acquire_socket()?;
        let listener = listener::bind(endpoint).await?;
        Ok(BoundListener { listener, permit })
    }

    pub async fn new_router(&self, endpoint: SocketAddr) -> Result<RouterSocket> {
        let bound = self.bind_listener(endpoint).await?;
        let socket = RouterSocket::spawn(
            bound.listener,
            self.config.clone(),
            self.context.child_token(),
            bound.permit,
        )?;
        Ok(socket)
    }

    pub async fn new_rep(&self, endpoint: SocketAddr) -> Result<RepSocket> {
        let bound = self.bind_listener(endpoint).await?;
        let socket = RepSocket::spawn(
            bound.listener,
            self.config.clone(),
            self.context.child_token(),
            bound.permit,
        )?;
        Ok(socket)
    }

    /// Token for a background loop that must stop with this factory's context
    pub fn child_token(&self) -> CancellationToken {
        self.context.child_token()
    }
}
