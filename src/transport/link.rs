//! Connecting sockets
//!
//! A [`Link`] is the connecting half of a transport connection. It runs in
//! its own task and keeps the TCP stream alive on behalf of its owner:
//!
//! ```text
//!   owner ──send()──► outbound queue ──► [link task] ──► TCP ──► peer
//!   owner ◄──recv()── inbound queue  ◄── [link task] ◄── TCP ◄── peer
//! ```
//!
//! The task connects lazily and reconnects after any failure, re-announcing
//! itself with HELLO and replaying its subscriptions. Outbound packets
//! queue while the peer is away; a message whose write failed is resent
//! first on the next connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::codec::{Packet, PacketCodec, SocketKind};
use super::factory::SocketConfig;

/// Connecting end of a transport connection
#[derive(Debug)]
pub(crate) struct Link {
    endpoint: SocketAddr,
    outbound: Option<mpsc::UnboundedSender<Packet>>,
    inbound: mpsc::UnboundedReceiver<Vec<Bytes>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    _permit: OwnedSemaphorePermit,
}

impl Link {
    pub(crate) fn spawn(
        endpoint: SocketAddr,
        kind: SocketKind,
        identity: Bytes,
        config: &SocketConfig,
        cancel: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let worker = LinkWorker {
            endpoint,
            hello: Packet::Hello { kind, identity },
            config: config.clone(),
            subscriptions: HashMap::new(),
            pending: None,
            inbound: inbound_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run(outbound_rx));

        Self {
            endpoint,
            outbound: Some(outbound_tx),
            inbound: inbound_rx,
            cancel,
            task: Some(task),
            _permit: permit,
        }
    }

    pub(crate) fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Queue a packet for delivery
    pub(crate) fn send(&self, packet: Packet) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Closed);
        }
        self.outbound
            .as_ref()
            .ok_or(Error::Closed)?
            .send(packet)
            .map_err(|_| Error::Closed)
    }

    /// Next message from the peer, or `None` once the link is closed
    pub(crate) async fn recv(&mut self) -> Option<Vec<Bytes>> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            frames = self.inbound.recv() => frames,
        }
    }

    /// Drain queued packets for at most `linger`, then stop the task
    pub(crate) async fn close(mut self, linger: Duration) {
        self.outbound.take();
        if let Some(mut task) = self.task.take() {
            if !linger.is_zero() && tokio::time::timeout(linger, &mut task).await.is_ok() {
                return;
            }
            self.cancel.cancel();
            let _ = task.await;
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct LinkWorker {
    endpoint: SocketAddr,
    hello: Packet,
    config: SocketConfig,
    /// Prefix -> local subscribe count. Only 0->1 and 1->0 transitions
    /// reach the wire.
    subscriptions: HashMap<Bytes, usize>,
    pending: Option<Packet>,
    inbound: mpsc::UnboundedSender<Vec<Bytes>>,
    cancel: CancellationToken,
}

enum SessionEnd {
    Closed,
    Disconnected,
}

impl LinkWorker {
    async fn run(mut self, mut outbound: mpsc::UnboundedReceiver<Packet>) {
        loop {
            let stream = tokio::select! {
                _ = self.cancel.cancelled() => return,
                stream = self.connect() => stream,
            };

            let framed = Framed::new(stream, PacketCodec);
            match self.session(framed, &mut outbound).await {
                SessionEnd::Closed => return,
                SessionEnd::Disconnected => {
                    tracing::debug!(endpoint = %self.endpoint, "Link lost, reconnecting");
                }
            }
        }
    }

    async fn connect(&self) -> TcpStream {
        loop {
            match TcpStream::connect(self.endpoint).await {
                Ok(stream) => {
                    if self.config.tcp_nodelay {
                        let _ = stream.set_nodelay(true);
                    }
                    tracing::trace!(endpoint = %self.endpoint, "Link connected");
                    return stream;
                }
                Err(e) => {
                    tracing::trace!(endpoint = %self.endpoint, error = %e, "Connect failed");
                    tokio::time::sleep(self.config.reconnect_interval).await;
                }
            }
        }
    }

    async fn session(
        &mut self,
        mut framed: Framed<TcpStream, PacketCodec>,
        outbound: &mut mpsc::UnboundedReceiver<Packet>,
    ) -> SessionEnd {
        let mut replay = vec![self.hello.clone()];
        replay.extend(self.subscriptions.keys().cloned().map(Packet::Subscribe));
        replay.extend(self.pending.take());

        for packet in replay {
            if let Err(e) = framed.send(packet.clone()).await {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "Replay failed");
                self.keep_pending(packet);
                return SessionEnd::Disconnected;
            }
        }

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return SessionEnd::Closed,

                packet = outbound.recv() => {
                    let Some(packet) = packet else {
                        return SessionEnd::Closed;
                    };
                    let Some(packet) = self.track(packet) else {
                        continue;
                    };
                    if let Err(e) = framed.send(packet.clone()).await {
                        tracing::debug!(endpoint = %self.endpoint, error = %e, "Write failed");
                        self.keep_pending(packet);
                        return SessionEnd::Disconnected;
                    }
                }

                incoming = framed.next() => match incoming {
                    Some(Ok(Packet::Message(frames))) => {
                        let _ = self.inbound.send(frames);
                    }
                    Some(Ok(other)) => {
                        tracing::trace!(endpoint = %self.endpoint, packet = ?other, "Ignoring packet");
                    }
                    Some(Err(e)) => {
                        tracing::debug!(endpoint = %self.endpoint, error = %e, "Read failed");
                        return SessionEnd::Disconnected;
                    }
                    None => return SessionEnd::Disconnected,
                },
            }
        }
    }

    fn keep_pending(&mut self, packet: Packet) {
        if matches!(packet, Packet::Message(_)) {
            self.pending = Some(packet);
        }
    }

    /// Update the subscription table; returns the packet if it must be sent
    fn track(&mut self, packet: Packet) -> Option<Packet> {
        match packet {
            Packet::Subscribe(prefix) => {
                let count = self.subscriptions.entry(prefix.clone()).or_insert(0);
                *count += 1;
                (*count == 1).then_some(Packet::Subscribe(prefix))
            }
            Packet::Unsubscribe(prefix) => {
                let count = self.subscriptions.get_mut(&prefix)?;
                *count -= 1;
                if *count == 0 {
                    self.subscriptions.remove(&prefix);
                    Some(Packet::Unsubscribe(prefix))
                } else {
                    None
                }
            }
            other => Some(other),
        }
    }
}

/// Publish-only socket
#[derive(Debug)]
pub struct PubSocket {
    link: Link,
}

impl PubSocket {
    pub(crate) fn new(link: Link) -> Self {
        Self { link }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.link.endpoint()
    }

    /// Queue a multi-frame message
    pub fn send(&self, frames: Vec<Bytes>) -> Result<()> {
        self.link.send(Packet::Message(frames))
    }

    pub async fn close(self, linger: Duration) {
        self.link.close(linger).await
    }
}

/// Subscribe-only socket
#[derive(Debug)]
pub struct SubSocket {
    link: Link,
}

impl SubSocket {
    pub(crate) fn new(link: Link) -> Self {
        Self { link }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.link.endpoint()
    }

    /// Receive messages whose first frame starts with `prefix`
    pub fn subscribe(&self, prefix: impl Into<Bytes>) -> Result<()> {
        self.link.send(Packet::Subscribe(prefix.into()))
    }

    pub fn unsubscribe(&self, prefix: impl Into<Bytes>) -> Result<()> {
        self.link.send(Packet::Unsubscribe(prefix.into()))
    }

    pub async fn recv(&mut self) -> Option<Vec<Bytes>> {
        self.link.recv().await
    }

    pub async fn close(self, linger: Duration) {
        self.link.close(linger).await
    }
}

/// Identity-bearing socket that receives messages routed to it
#[derive(Debug)]
pub struct DealerSocket {
    link: Link,
    identity: Bytes,
}

impl DealerSocket {
    pub(crate) fn new(link: Link, identity: Bytes) -> Self {
        Self { link, identity }
    }

    pub fn identity(&self) -> &Bytes {
        &self.identity
    }

    pub fn send(&self, frames: Vec<Bytes>) -> Result<()> {
        self.link.send(Packet::Message(frames))
    }

    pub async fn recv(&mut self) -> Option<Vec<Bytes>> {
        self.link.recv().await
    }

    pub async fn close(self, linger: Duration) {
        self.link.close(linger).await
    }
}

/// Request side of a request/response pair
#[derive(Debug)]
pub struct ReqSocket {
    link: Link,
}

impl ReqSocket {
    pub(crate) fn new(link: Link) -> Self {
        Self { link }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.link.endpoint()
    }

    /// Send one request and wait for its reply.
    ///
    /// After a timeout the socket may still receive the late reply; callers
    /// should discard the socket rather than reuse it.
    pub async fn request(&mut self, frames: Vec<Bytes>, timeout: Duration) -> Result<Vec<Bytes>> {
        self.link.send(Packet::Message(frames))?;

        match tokio::time::timeout(timeout, self.link.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(Error::Closed),
            Err(_) => Err(Error::RequestTimeout {
                address: self.link.endpoint().to_string(),
                timeout,
            }),
        }
    }

    pub async fn close(self, linger: Duration) {
        self.link.close(linger).await
    }
}
