//! Bound sockets
//!
//! [`RouterSocket`] addresses connected peers by the identity they
//! announced in HELLO. [`RepSocket`] hands each request to its owner and
//! writes back exactly one reply per request, per connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use super::codec::{Packet, PacketCodec};
use super::listener::read_hello;

type PeerTable = Arc<Mutex<HashMap<Bytes, mpsc::UnboundedSender<Packet>>>>;

/// Identity-routed bound socket
#[derive(Debug)]
pub struct RouterSocket {
    local_addr: SocketAddr,
    peers: PeerTable,
    inbound: mpsc::UnboundedReceiver<(Bytes, Vec<Bytes>)>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    _permit: OwnedSemaphorePermit,
}

impl RouterSocket {
    pub(crate) fn spawn(
        listener: tokio::net::TcpListener,
        config: super::factory::SocketConfig,
        cancel: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let peers: PeerTable = Arc::new(Mutex::new(HashMap::new()));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let table = Arc::clone(&peers);
        let task = tokio::spawn(super::listener::accept_loop(
            listener,
            config,
            cancel.clone(),
            "router",
            move |socket, peer, token| {
                handle_router_peer(socket, peer, token, Arc::clone(&table), inbound_tx.clone())
            },
        ));

        Ok(Self {
            local_addr,
            peers,
            inbound: inbound_rx,
            cancel,
            task: Some(task),
            _permit: permit,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Route a message to the peer with `identity`.
    ///
    /// Returns `false` when no such peer is connected; the message is dropped.
    pub fn send(&self, identity: &[u8], frames: Vec<Bytes>) -> bool {
        let peers = match self.peers.lock() {
            Ok(peers) => peers,
            Err(poisoned) => poisoned.into_inner(),
        };
        match peers.get(identity) {
            Some(tx) => tx.send(Packet::Message(frames)).is_ok(),
            None => false,
        }
    }

    /// Next `(identity, frames)` from any peer
    pub async fn recv(&mut self) -> Option<(Bytes, Vec<Bytes>)> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            msg = self.inbound.recv() => msg,
        }
    }

    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RouterSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn handle_router_peer(
    socket: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
    peers: PeerTable,
    inbound: mpsc::UnboundedSender<(Bytes, Vec<Bytes>)>,
) {
    let mut framed = Framed::new(socket, PacketCodec);
    let Some(mut identity) = read_hello(&mut framed, peer).await else {
        return;
    };
    if identity.is_empty() {
        identity = Bytes::from(uuid::Uuid::new_v4().to_string());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Ok(mut table) = peers.lock() {
        table.insert(identity.clone(), tx.clone());
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            Some(packet) = rx.recv() => {
                if let Err(e) = framed.send(packet).await {
                    tracing::debug!(peer = %peer, error = %e, "Router write failed");
                    break;
                }
            }

            incoming = framed.next() => match incoming {
                Some(Ok(Packet::Message(frames))) => {
                    let _ = inbound.send((identity.clone(), frames));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(peer = %peer, error = %e, "Router read failed");
                    break;
                }
                None => break,
            },
        }
    }

    // A reconnect may already have replaced this entry
    if let Ok(mut table) = peers.lock() {
        if table.get(&identity).is_some_and(|current| current.same_channel(&tx)) {
            table.remove(&identity);
        }
    }
}

/// A request received on a [`RepSocket`]
#[derive(Debug)]
pub struct Request {
    frames: Vec<Bytes>,
    peer: SocketAddr,
    reply: oneshot::Sender<Vec<Bytes>>,
}

impl Request {
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Answer the request. Fails only if the requester went away.
    pub fn reply(self, frames: Vec<Bytes>) -> bool {
        self.reply.send(frames).is_ok()
    }
}

/// Reply side of a request/response pair
#[derive(Debug)]
pub struct RepSocket {
    local_addr: SocketAddr,
    inbound: mpsc::UnboundedReceiver<Request>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    _permit: OwnedSemaphorePermit,
}

impl RepSocket {
    pub(crate) fn spawn(
        listener: tokio::net::TcpListener,
        config: super::factory::SocketConfig,
        cancel: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(super::listener::accept_loop(
            listener,
            config,
            cancel.clone(),
            "rep",
            move |socket, peer, token| handle_rep_peer(socket, peer, token, inbound_tx.clone()),
        ));

        Ok(Self {
            local_addr,
            inbound: inbound_rx,
            cancel,
            task: Some(task),
            _permit: permit,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next request, or `None` once the socket is closed
    pub async fn recv(&mut self) -> Option<Request> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            req = self.inbound.recv() => req,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RepSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn handle_rep_peer(
    socket: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
    inbound: mpsc::UnboundedSender<Request>,
) {
    let mut framed = Framed::new(socket, PacketCodec);
    if read_hello(&mut framed, peer).await.is_none() {
        return;
    }

    loop {
        let frames = tokio::select! {
            _ = cancel.cancelled() => return,
            incoming = framed.next() => match incoming {
                Some(Ok(Packet::Message(frames))) => frames,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!(peer = %peer, error = %e, "Request read failed");
                    return;
                }
                None => return,
            },
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request {
            frames,
            peer,
            reply: reply_tx,
        };
        if inbound.send(request).is_err() {
            return;
        }

        let reply = tokio::select! {
            _ = cancel.cancelled() => return,
            reply = reply_rx => reply,
        };
        // Dropped without an answer: nothing to send back
        let Ok(frames) = reply else {
            continue;
        };
        if let Err(e) = framed.send(Packet::Message(frames)).await {
            tracing::debug!(peer = %peer, error = %e, "Reply write failed");
            return;
        }
    }
}
