//! Accept loop shared by every bound socket
//!
//! Binds a TCP listener, then spawns one handler task per accepted
//! connection. Handler tasks get a child of the listener's cancellation
//! token, and the loop waits for all of them before returning.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::codec::{Packet, PacketCodec, SocketKind};
use super::factory::SocketConfig;

/// Bind `endpoint`, translating OS errors into crate errors
pub(crate) async fn bind(endpoint: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(endpoint).await.map_err(|e| match e.kind() {
        io::ErrorKind::AddrInUse => Error::AddressInUse(endpoint),
        io::ErrorKind::AddrNotAvailable => {
            Error::InvalidAddress(format!("{} is not a local address", endpoint))
        }
        _ => Error::Io(e),
    })
}

/// Run the accept loop until `cancel` fires
pub(crate) async fn accept_loop<F, Fut>(
    listener: TcpListener,
    config: SocketConfig,
    cancel: CancellationToken,
    role: &'static str,
    handler: F,
) where
    F: Fn(TcpStream, SocketAddr, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            accepted = listener.accept() => match accepted {
                Ok((socket, peer_addr)) => {
                    if let Err(e) = configure_socket(&socket, &config) {
                        tracing::error!(role, error = %e, "Failed to configure socket");
                        continue;
                    }
                    tracing::debug!(role, peer = %peer_addr, "New connection");
                    connections.spawn(handler(socket, peer_addr, cancel.child_token()));
                }
                Err(e) => {
                    tracing::error!(role, error = %e, "Failed to accept connection");
                }
            },
        }
    }

    while connections.join_next().await.is_some() {}
    tracing::debug!(role, "Accept loop stopped");
}

/// Wait for the HELLO that opens every connection; returns the identity
pub(crate) async fn read_hello(
    framed: &mut Framed<TcpStream, PacketCodec>,
    peer: SocketAddr,
) -> Option<Bytes> {
    read_hello_kind(framed, peer).await.map(|(_, identity)| identity)
}

/// Like [`read_hello`], also returning the peer's socket kind
pub(crate) async fn read_hello_kind(
    framed: &mut Framed<TcpStream, PacketCodec>,
    peer: SocketAddr,
) -> Option<(SocketKind, Bytes)> {
    match framed.next().await {
        Some(Ok(Packet::Hello { kind, identity })) => Some((kind, identity)),
        Some(Ok(other)) => {
            tracing::debug!(peer = %peer, packet = ?other, "Expected HELLO");
            None
        }
        Some(Err(e)) => {
            tracing::debug!(peer = %peer, error = %e, "Bad HELLO");
            None
        }
        None => None,
    }
}

fn configure_socket(socket: &TcpStream, config: &SocketConfig) -> io::Result<()> {
    if config.tcp_nodelay {
        socket.set_nodelay(true)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_in_use_is_typed() {
        let first = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let taken = first.local_addr().unwrap();

        match bind(taken).await {
            Err(Error::AddressInUse(addr)) => assert_eq!(addr, taken),
            other => panic!("expected AddressInUse, got {:?}", other.map(|_| ())),
        }
    }
}
