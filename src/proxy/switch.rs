//! Forwarding device
//!
//! Publishers connect to the frontend, subscribers to the backend. Every
//! message read from a publisher is copied to each subscriber holding a
//! subscription that prefixes the message's first frame. Payloads are
//! never inspected.
//!
//! Each publisher connection forwards its messages in order, and each
//! subscriber has a single outbound queue, so per-publisher order is
//! preserved at every subscriber.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::stats::RelayStats;
use crate::transport::listener::{accept_loop, read_hello};
use crate::transport::{Packet, PacketCodec, SocketConfig};

#[derive(Debug)]
struct Subscriber {
    prefixes: HashSet<Bytes>,
    outbound: mpsc::UnboundedSender<Packet>,
}

#[derive(Debug, Default)]
struct SwitchState {
    subscribers: HashMap<u64, Subscriber>,
    next_id: u64,
    stats: RelayStats,
}

/// Shared switch state: subscriber table and counters under one lock
#[derive(Debug, Clone, Default)]
pub(crate) struct Switch {
    state: Arc<Mutex<SwitchState>>,
    verbose: bool,
}

impl Switch {
    pub(crate) fn new(verbose: bool) -> Self {
        Self {
            state: Arc::default(),
            verbose,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SwitchState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn stats(&self) -> RelayStats {
        self.lock().stats.clone()
    }

    /// Run both accept loops until `cancel` fires
    pub(crate) async fn run(
        self,
        frontend: TcpListener,
        backend: TcpListener,
        config: SocketConfig,
        cancel: CancellationToken,
    ) {
        let publishers = {
            let switch = self.clone();
            accept_loop(
                frontend,
                config.clone(),
                cancel.clone(),
                "xsub",
                move |socket, peer, token| switch.clone().serve_publisher(socket, peer, token),
            )
        };
        let subscribers = {
            let switch = self.clone();
            accept_loop(
                backend,
                config,
                cancel,
                "xpub",
                move |socket, peer, token| switch.clone().serve_subscriber(socket, peer, token),
            )
        };

        tokio::join!(publishers, subscribers);
    }

    /// Copy `frames` to every matching subscriber
    fn forward(&self, frames: Vec<Bytes>) {
        let mut state = self.lock();
        let topic = frames.first().cloned().unwrap_or_default();

        let mut copies = 0;
        for subscriber in state.subscribers.values() {
            if subscriber.prefixes.iter().any(|p| topic.starts_with(p)) {
                let _ = subscriber.outbound.send(Packet::Message(frames.clone()));
                copies += 1;
            }
        }
        state.stats.record_message(&frames, copies);

        if self.verbose {
            tracing::info!(
                topic = %String::from_utf8_lossy(&topic),
                frames = frames.len(),
                copies = copies,
                "Forwarded message"
            );
        }
    }

    async fn serve_publisher(self, socket: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        let mut framed = Framed::new(socket, PacketCodec);
        if read_hello(&mut framed, peer).await.is_none() {
            return;
        }
        self.lock().stats.publishers += 1;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                incoming = framed.next() => match incoming {
                    Some(Ok(Packet::Message(frames))) => self.forward(frames),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(peer = %peer, error = %e, "Publisher read failed");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.lock().stats.publishers -= 1;
        tracing::debug!(peer = %peer, "Publisher disconnected");
    }

    async fn serve_subscriber(self, socket: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        let mut framed = Framed::new(socket, PacketCodec);
        if read_hello(&mut framed, peer).await.is_none() {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(
                id,
                Subscriber {
                    prefixes: HashSet::new(),
                    outbound: tx,
                },
            );
            state.stats.subscribers += 1;
            id
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                Some(packet) = rx.recv() => {
                    if let Err(e) = framed.send(packet).await {
                        tracing::debug!(peer = %peer, error = %e, "Subscriber write failed");
                        break;
                    }
                }

                incoming = framed.next() => match incoming {
                    Some(Ok(Packet::Subscribe(prefix))) => self.update(id, prefix, true),
                    Some(Ok(Packet::Unsubscribe(prefix))) => self.update(id, prefix, false),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(peer = %peer, error = %e, "Subscriber read failed");
                        break;
                    }
                    None => break,
                },
            }
        }

        let mut state = self.lock();
        state.subscribers.remove(&id);
        state.stats.subscribers -= 1;
        tracing::debug!(peer = %peer, "Subscriber disconnected");
    }

    fn update(&self, id: u64, prefix: Bytes, subscribe: bool) {
        let mut state = self.lock();
        let Some(subscriber) = state.subscribers.get_mut(&id) else {
            return;
        };

        let changed = if subscribe {
            subscriber.prefixes.insert(prefix.clone())
        } else {
            subscriber.prefixes.remove(&prefix)
        };
        if !changed {
            return;
        }

        if subscribe {
            state.stats.subscribes += 1;
        } else {
            state.stats.unsubscribes += 1;
        }

        if self.verbose {
            tracing::info!(
                topic = %String::from_utf8_lossy(&prefix),
                subscribe = subscribe,
                "Subscription changed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::{Context, SocketFactory};

    #[tokio::test]
    async fn test_prefix_routing() {
        let factory = SocketFactory::new(Context::new());
        let frontend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let pub_addr = frontend.local_addr().unwrap();
        let sub_addr = backend.local_addr().unwrap();

        let switch = Switch::new(false);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(switch.clone().run(
            frontend,
            backend,
            SocketConfig::default(),
            cancel.clone(),
        ));

        let mut wide = factory.new_sub(sub_addr).unwrap();
        wide.subscribe("d").unwrap();
        let mut narrow = factory.new_sub(sub_addr).unwrap();
        narrow.subscribe("d:x").unwrap();
        let publisher = factory.new_pub(pub_addr).unwrap();

        // Wait until both subscriptions have reached the switch
        for _ in 0..50 {
            if switch.stats().subscribes == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(switch.stats().subscribes, 2);

        publisher
            .send(vec![Bytes::from_static(b"d:s"), Bytes::from_static(b"1")])
            .unwrap();
        publisher
            .send(vec![Bytes::from_static(b"d:x"), Bytes::from_static(b"2")])
            .unwrap();

        let first = wide.recv().await.unwrap();
        assert_eq!(&first[1][..], b"1");
        let second = wide.recv().await.unwrap();
        assert_eq!(&second[1][..], b"2");

        let only = narrow.recv().await.unwrap();
        assert_eq!(&only[1][..], b"2");

        let stats = switch.stats();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.messages_forwarded, 3);

        cancel.cancel();
        task.await.unwrap();
    }
}
