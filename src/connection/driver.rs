//! Client-side proxy connection
//!
//! A [`ConnectionDriver`] wraps one publish or subscribe socket to a proxy.
//! The role decides which operations are available: subscriptions only make
//! sense on a subscriber, sending only on a publisher. Calling the other
//! role's operations yields `Error::WrongRole`.
//!
//! The handshake checks publish a control frame repeatedly, once per poll
//! interval, until the controller's answer arrives or the timeout elapses:
//!
//! ```text
//! check_connection:    [ctrl, "pub", id] ──relay──► controller ──router──► dealer(id)
//! check_subscription:  [ctrl, "sub", topic] ──relay──► controller ──relay──► this socket
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::address::ProxyAddress;
use crate::error::{Error, HandshakeError, Result};
use crate::proxy::control::{
    is_control_echo, is_routed_reply, is_subscribe_echo, ControlFrame, ControlType,
};
use crate::topic::{Topic, ANY};
use crate::transport::{PubSocket, SocketFactory, SubSocket};

use super::setup::ConnectionSetup;

/// Which side of pub/sub a connection serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Publisher => "publisher",
            Role::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
enum Socket {
    Pub(PubSocket),
    Sub(SubSocket),
}

/// Wire prefix that selects every message under `topic`.
///
/// The prefix stops at the first wildcard, so it may select more than the
/// topic covers; receivers filter with [`Topic::is_parent`].
pub fn subscription_prefix(topic: &Topic) -> String {
    if topic.domain() == ANY {
        String::new()
    } else if topic.subject() == ANY {
        topic.domain().to_string()
    } else if topic.kind() == ANY {
        format!("{}:{}", topic.domain(), topic.subject())
    } else {
        topic.to_string()
    }
}

/// One connection to a proxy
#[derive(Debug)]
pub struct ConnectionDriver {
    factory: SocketFactory,
    address: ProxyAddress,
    role: Role,
    setup: ConnectionSetup,
    socket: Option<Socket>,
    /// Data messages read while waiting for a subscribe echo
    buffered: VecDeque<Vec<Bytes>>,
}

impl ConnectionDriver {
    /// Create an unconnected driver
    pub fn new(
        factory: SocketFactory,
        address: ProxyAddress,
        role: Role,
        setup: ConnectionSetup,
    ) -> Self {
        Self {
            factory,
            address,
            role,
            setup,
            socket: None,
            buffered: VecDeque::new(),
        }
    }

    pub fn address(&self) -> ProxyAddress {
        self.address
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn setup(&self) -> &ConnectionSetup {
        &self.setup
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Create the socket. Calling it again does nothing.
    pub fn connect(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = match self.role {
            Role::Publisher => Socket::Pub(self.factory.new_pub(self.address.pub_endpoint())?),
            Role::Subscriber => Socket::Sub(self.factory.new_sub(self.address.sub_endpoint())?),
        };
        tracing::debug!(address = %self.address, role = %self.role, "Connected to proxy");
        self.socket = Some(socket);
        Ok(())
    }

    fn subscriber(&mut self, operation: &'static str) -> Result<&mut SubSocket> {
        if self.role != Role::Subscriber {
            return Err(Error::WrongRole {
                operation,
                role: self.role.as_str(),
            });
        }
        self.connect()?;
        match self.socket.as_mut() {
            Some(Socket::Sub(sub)) => Ok(sub),
            _ => Err(Error::Closed),
        }
    }

    pub fn subscribe(&mut self, topic: &Topic) -> Result<()> {
        let prefix = subscription_prefix(topic);
        self.subscriber("subscribe")?.subscribe(prefix)?;
        tracing::debug!(address = %self.address, topic = %topic, "Subscribed");
        Ok(())
    }

    pub fn unsubscribe(&mut self, topic: &Topic) -> Result<()> {
        let prefix = subscription_prefix(topic);
        self.subscriber("unsubscribe")?.unsubscribe(prefix)?;
        tracing::debug!(address = %self.address, topic = %topic, "Unsubscribed");
        Ok(())
    }

    /// Publish a multi-frame message
    pub fn send(&mut self, frames: Vec<Bytes>) -> Result<()> {
        if self.role != Role::Publisher {
            return Err(Error::WrongRole {
                operation: "send",
                role: self.role.as_str(),
            });
        }
        self.connect()?;
        match self.socket.as_ref() {
            Some(Socket::Pub(publisher)) => publisher.send(frames),
            _ => Err(Error::Closed),
        }
    }

    /// Next message for a subscriber, or `None` once the socket is closed.
    ///
    /// Publishers never receive and get `None` at once.
    pub async fn receive(&mut self) -> Option<Vec<Bytes>> {
        if let Some(frames) = self.buffered.pop_front() {
            return Some(frames);
        }
        match self.socket.as_mut() {
            Some(Socket::Sub(sub)) => sub.recv().await,
            _ => None,
        }
    }

    /// Confirm that messages sent through this connection reach the proxy
    pub async fn check_connection(&mut self, timeout: Duration) -> Result<()> {
        match self.round_trip(ControlType::Connect, timeout).await? {
            Some(_) => {
                tokio::time::sleep(self.setup.post_connection_sleep).await;
                Ok(())
            }
            None => Err(HandshakeError::ConnectionNotConfirmed {
                address: self.address.to_string(),
                timeout,
            }
            .into()),
        }
    }

    /// Measure a round trip through the relay and the controller
    pub async fn probe_relay(&mut self, timeout: Duration) -> Result<Duration> {
        self.round_trip(ControlType::Reply, timeout)
            .await?
            .ok_or_else(|| {
                HandshakeError::ConnectionNotConfirmed {
                    address: self.address.to_string(),
                    timeout,
                }
                .into()
            })
    }

    /// Publish `kind` control frames until the routed reply arrives.
    ///
    /// Returns the elapsed time, or `None` when `timeout` ran out first.
    async fn round_trip(&mut self, kind: ControlType, timeout: Duration) -> Result<Option<Duration>> {
        self.connect()?;

        let identity = uuid::Uuid::new_v4().to_string();
        let mut dealer = self
            .factory
            .new_dealer(self.address.control_endpoint(), identity.clone())?;

        // Subscribers have no publish path of their own
        let temporary = match self.socket {
            Some(Socket::Pub(_)) => None,
            _ => Some(self.factory.new_pub(self.address.pub_endpoint())?),
        };
        let publisher = match (&temporary, &self.socket) {
            (Some(publisher), _) | (None, Some(Socket::Pub(publisher))) => publisher,
            _ => return Err(Error::Closed),
        };

        let request = ControlFrame::new(kind, identity.clone()).to_frames();
        let start = Instant::now();
        let deadline = start + timeout;

        let result = loop {
            publisher.send(request.clone())?;

            let wake = (Instant::now() + self.setup.retry_interval()).min(deadline);
            match tokio::time::timeout_at(wake, dealer.recv()).await {
                Ok(Some(frames)) if is_routed_reply(&frames, kind, &identity) => {
                    break Some(start.elapsed());
                }
                Ok(Some(_)) => tokio::time::sleep_until(wake).await,
                Ok(None) => return Err(Error::Closed),
                Err(_) => {}
            }

            if Instant::now() >= deadline {
                break None;
            }
        };

        dealer.close(Duration::ZERO).await;
        if let Some(temporary) = temporary {
            temporary.close(Duration::ZERO).await;
        }

        match result {
            Some(elapsed) => tracing::debug!(
                address = %self.address,
                kind = %kind,
                elapsed_ms = elapsed.as_millis() as u64,
                "Proxy round trip confirmed"
            ),
            None => tracing::debug!(
                address = %self.address,
                kind = %kind,
                timeout_ms = timeout.as_millis() as u64,
                "Proxy round trip not confirmed"
            ),
        }
        Ok(result)
    }

    /// Confirm that `topic`, already subscribed, has reached the proxy
    pub async fn check_subscription(&mut self, topic: &Topic, timeout: Duration) -> Result<()> {
        self.subscriber("check_subscription")?;

        let id = topic.to_string();
        let publisher = self.factory.new_pub(self.address.pub_endpoint())?;
        let request = ControlFrame::new(ControlType::Subscribe, id.clone()).to_frames();
        let deadline = Instant::now() + timeout;

        let Some(Socket::Sub(sub)) = self.socket.as_mut() else {
            return Err(Error::Closed);
        };

        let confirmed = 'attempts: loop {
            publisher.send(request.clone())?;
            let wake = (Instant::now() + self.setup.retry_interval()).min(deadline);

            loop {
                match tokio::time::timeout_at(wake, sub.recv()).await {
                    Ok(Some(frames)) if is_subscribe_echo(&frames, &id) => break 'attempts true,
                    Ok(Some(frames)) => {
                        if !is_control_echo(&frames) {
                            self.buffered.push_back(frames);
                        }
                    }
                    Ok(None) => return Err(Error::Closed),
                    Err(_) => break,
                }
            }

            if Instant::now() >= deadline {
                break false;
            }
        };

        publisher.close(Duration::ZERO).await;

        if !confirmed {
            return Err(HandshakeError::SubscriptionNotConfirmed {
                address: self.address.to_string(),
                topic: id,
                timeout,
            }
            .into());
        }

        tracing::debug!(address = %self.address, topic = %id, "Subscription confirmed");
        tokio::time::sleep(self.setup.post_subscription_sleep).await;
        Ok(())
    }

    /// Close the socket, draining queued messages for up to `linger`
    pub async fn close(mut self, linger: Duration) {
        match self.socket.take() {
            Some(Socket::Pub(publisher)) => publisher.close(linger).await,
            Some(Socket::Sub(sub)) => sub.close(linger).await,
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Context;

    fn driver(role: Role) -> ConnectionDriver {
        ConnectionDriver::new(
            SocketFactory::new(Context::new()),
            ProxyAddress::new("127.0.0.1", 17901).unwrap(),
            role,
            ConnectionSetup::default(),
        )
    }

    #[test]
    fn test_subscription_prefix() {
        let t = |s: &str| Topic::wrap(s).unwrap();
        assert_eq!(subscription_prefix(&t("d:s:t")), "d:s:t");
        assert_eq!(subscription_prefix(&t("d:s")), "d:s");
        assert_eq!(subscription_prefix(&t("d:*:t")), "d");
        assert_eq!(subscription_prefix(&t("*:s")), "");
    }

    #[tokio::test]
    async fn test_wrong_role() {
        let topic = Topic::wrap("d").unwrap();

        let mut publisher = driver(Role::Publisher);
        assert!(matches!(
            publisher.subscribe(&topic),
            Err(Error::WrongRole { operation: "subscribe", role: "publisher" })
        ));
        assert!(matches!(
            publisher.check_subscription(&topic, Duration::from_millis(10)).await,
            Err(Error::WrongRole { .. })
        ));

        let mut subscriber = driver(Role::Subscriber);
        assert!(matches!(
            subscriber.send(vec![Bytes::new()]),
            Err(Error::WrongRole { operation: "send", role: "subscriber" })
        ));
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let mut d = driver(Role::Subscriber);
        d.connect().unwrap();
        d.connect().unwrap();
        assert!(d.is_connected());
        assert_eq!(d.factory.context().open_sockets(), 1);
        d.close(Duration::ZERO).await;
    }
}
