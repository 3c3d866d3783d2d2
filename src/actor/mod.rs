//! Actors
//!
//! An [`Actor`] publishes and subscribes through proxies and registers its
//! topics with registrars. Connections come from a per-actor pool;
//! callbacks of all its subscriptions share one worker pool.
//!
//! ```text
//!   publish ──► pool(Publisher) ──► proxy ──► pool(Subscriber) ──► dispatch ──► callback
//!   register / discover ──► RegistrarDriver ──► registrar
//! ```

pub mod callback;
pub mod config;
pub mod subscription;

pub use callback::Callback;
pub use config::{ActorConfig, DEFAULT_POOL_SIZE};
pub use subscription::Subscription;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::address::{ProxyAddress, RegAddress};
use crate::connection::{ConnectionDriver, ConnectionPool, Role};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::proxy::control::is_control;
use crate::registration::{RegInfo, RegQuery, RegistrarDriver, RegistrationRecord};
use crate::topic::Topic;
use crate::transport::SocketFactory;

/// Domain of the topics sync publish replies arrive on
pub const REPLY_DOMAIN: &str = "ret";

/// Time pooled publishers get to flush when the actor closes
const CLOSE_LINGER: Duration = Duration::from_millis(500);

/// One driver per registrar; requests to different registrars run
/// concurrently
type SharedRegistrar = Arc<Mutex<RegistrarDriver>>;

/// A named participant that publishes, subscribes and registers
#[derive(Debug)]
pub struct Actor {
    name: String,
    id: String,
    config: ActorConfig,
    factory: SocketFactory,
    pool: Arc<ConnectionPool>,
    workers: Arc<Semaphore>,
    registrars: Mutex<HashMap<RegAddress, SharedRegistrar>>,
    sequence: AtomicU64,
    cancel: CancellationToken,
}

impl Actor {
    /// Create an actor. The name must not be blank.
    pub fn new(name: impl Into<String>, factory: SocketFactory, config: ActorConfig) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidName("actor name is empty".into()));
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let pool = Arc::new(ConnectionPool::new(factory.clone(), config.setup.clone()));
        let workers = Arc::new(Semaphore::new(config.pool_size.max(1)));
        let cancel = factory.child_token();

        tracing::debug!(name = %name, id = %id, pool_size = config.pool_size, "Actor created");
        Ok(Self {
            name,
            id,
            config,
            factory,
            pool,
            workers,
            registrars: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            cancel,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique id used in reply topics
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ActorConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Check out a confirmed connection from the pool
    pub async fn get_connection(&self, address: ProxyAddress, role: Role) -> Result<ConnectionDriver> {
        self.pool.get_connection(address, role).await
    }

    /// Return a connection to the pool
    pub fn release(&self, driver: ConnectionDriver) {
        self.pool.release(driver);
    }

    /// Publish through the default proxy
    pub async fn publish(&self, message: Message) -> Result<()> {
        self.publish_to(self.config.proxy, message).await
    }

    /// Publish through `address`. The sender is set to this actor's name
    /// unless the message already names one.
    pub async fn publish_to(&self, address: ProxyAddress, mut message: Message) -> Result<()> {
        if message.meta().sender.is_none() {
            message.meta_mut().sender = Some(self.name.clone());
        }

        let mut driver = self.pool.get_connection(address, Role::Publisher).await?;
        match driver.send(message.to_frames()) {
            Ok(()) => {
                self.pool.release(driver);
                Ok(())
            }
            Err(e) => {
                self.pool.destroy(driver).await;
                Err(e)
            }
        }
    }

    /// Subscribe through the default proxy
    pub async fn subscribe<C: Callback>(&self, topic: Topic, callback: C) -> Result<Subscription> {
        self.subscribe_to(self.config.proxy, topic, callback).await
    }

    /// Subscribe to `topic` through `address` and run `callback` for each
    /// message. The subscription is confirmed first unless disabled in the
    /// connection setup.
    pub async fn subscribe_to<C: Callback>(
        &self,
        address: ProxyAddress,
        topic: Topic,
        callback: C,
    ) -> Result<Subscription> {
        let mut driver = self.pool.get_connection(address, Role::Subscriber).await?;
        if let Err(e) = self.confirm_subscription(&mut driver, &topic).await {
            tracing::warn!(topic = %topic, address = %address, error = %e, "Subscription failed");
            self.pool.destroy(driver).await;
            return Err(e);
        }

        Ok(Subscription::spawn(
            driver,
            topic,
            Arc::new(callback),
            Arc::clone(&self.workers),
            Arc::clone(&self.pool),
            self.cancel.child_token(),
        ))
    }

    async fn confirm_subscription(&self, driver: &mut ConnectionDriver, topic: &Topic) -> Result<()> {
        driver.subscribe(topic)?;
        let setup = self.pool.setup();
        if setup.check_subscription {
            driver.check_subscription(topic, setup.subscription_timeout).await?;
        }
        Ok(())
    }

    /// Stop a subscription and wait for its callbacks
    pub async fn unsubscribe(&self, subscription: Subscription) {
        subscription.stop().await;
    }

    /// Publish through the default proxy and wait for the response
    pub async fn sync_publish(&self, message: Message, timeout: Duration) -> Result<Message> {
        self.sync_publish_to(self.config.proxy, message, timeout).await
    }

    /// Publish `message` with a reply topic and wait up to `timeout` for the
    /// correlated response.
    ///
    /// The reply subscription is removed on every path. A timeout yields
    /// `Error::SyncPublishTimeout`.
    pub async fn sync_publish_to(
        &self,
        address: ProxyAddress,
        mut message: Message,
        timeout: Duration,
    ) -> Result<Message> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let reply_topic = Topic::build(REPLY_DOMAIN, Some(&self.id), Some(&seq.to_string()))?;
        {
            let meta = message.meta_mut();
            meta.reply_to = Some(reply_topic.to_string());
            meta.communication_id = Some(seq);
        }

        let mut driver = self.pool.get_connection(address, Role::Subscriber).await?;
        let result = self
            .exchange(&mut driver, address, &reply_topic, message, timeout)
            .await;

        if let Err(e) = driver.unsubscribe(&reply_topic) {
            tracing::debug!(topic = %reply_topic, error = %e, "Reply unsubscribe failed");
        }
        match &result {
            Ok(_) => self.pool.release(driver),
            Err(e) => {
                tracing::debug!(topic = %reply_topic, error = %e, "Sync publish failed");
                self.pool.destroy(driver).await;
            }
        }
        result
    }

    async fn exchange(
        &self,
        driver: &mut ConnectionDriver,
        address: ProxyAddress,
        reply_topic: &Topic,
        message: Message,
        timeout: Duration,
    ) -> Result<Message> {
        self.confirm_subscription(driver, reply_topic).await?;

        let topic = message.topic().to_string();
        let id = message.meta().communication_id;
        self.publish_to(address, message).await?;

        let wait = async {
            loop {
                let Some(frames) = driver.receive().await else {
                    return Err(Error::Closed);
                };
                if is_control(&frames) {
                    continue;
                }
                match Message::from_frames(frames) {
                    Ok(reply) if reply.topic() == reply_topic && reply.meta().communication_id == id => {
                        return Ok(reply);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!(topic = %reply_topic, error = %e, "Skipping undecodable reply"),
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(reply) => reply,
            Err(_) => Err(Error::SyncPublishTimeout { topic, timeout }),
        }
    }

    fn record(&self, info: &RegInfo) -> Result<RegistrationRecord> {
        RegistrationRecord::new(
            self.name.clone(),
            info.owner(),
            self.config.proxy.host().to_string(),
            self.config.proxy.pub_port(),
            info.topic().clone(),
            info.description(),
        )
    }

    async fn registrar(&self, address: RegAddress) -> SharedRegistrar {
        let mut registrars = self.registrars.lock().await;
        let driver = registrars.entry(address).or_insert_with(|| {
            let driver = RegistrarDriver::new(self.factory.clone(), address, self.name.clone())
                .with_timeout(self.config.registrar_timeout);
            Arc::new(Mutex::new(driver))
        });
        Arc::clone(driver)
    }

    /// Register with the default registrar
    pub async fn register(&self, info: RegInfo) -> Result<()> {
        self.register_at(self.config.registrar, info).await
    }

    /// Register a topic this actor publishes or subscribes to. The record
    /// carries the actor's name and its proxy's host and port.
    pub async fn register_at(&self, address: RegAddress, info: RegInfo) -> Result<()> {
        let record = self.record(&info)?;
        let registrar = self.registrar(address).await;
        registrar.lock().await.register(record).await?;
        tracing::info!(name = %self.name, owner = %info.owner(), topic = %info.topic(), "Registered");
        Ok(())
    }

    /// Remove a registration from the default registrar
    pub async fn deregister(&self, info: RegInfo) -> Result<()> {
        self.deregister_at(self.config.registrar, info).await
    }

    pub async fn deregister_at(&self, address: RegAddress, info: RegInfo) -> Result<()> {
        let record = self.record(&info)?;
        let registrar = self.registrar(address).await;
        registrar.lock().await.remove(record).await?;
        tracing::info!(name = %self.name, owner = %info.owner(), topic = %info.topic(), "Deregistered");
        Ok(())
    }

    /// Query the default registrar
    pub async fn discover(&self, query: &RegQuery) -> Result<HashSet<RegistrationRecord>> {
        self.discover_at(self.config.registrar, query).await
    }

    pub async fn discover_at(
        &self,
        address: RegAddress,
        query: &RegQuery,
    ) -> Result<HashSet<RegistrationRecord>> {
        let registrar = self.registrar(address).await;
        let records = registrar.lock().await.query(query).await?;
        Ok(records)
    }

    /// Stop every subscription and close pooled connections
    pub async fn close(self) {
        self.cancel.cancel();
        self.pool.close(CLOSE_LINGER).await;
        let registrars = self.registrars.into_inner();
        for (address, driver) in registrars {
            match Arc::try_unwrap(driver) {
                Ok(driver) => driver.into_inner().close().await,
                Err(_) => tracing::debug!(registrar = %address, "Registrar driver still in use"),
            }
        }
        tracing::debug!(name = %self.name, "Actor closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::OwnerType;
    use crate::transport::Context;

    fn actor(name: &str) -> Result<Actor> {
        let config = ActorConfig::new(
            ProxyAddress::new("127.0.0.1", 17931).unwrap(),
            RegAddress::new("127.0.0.1", 17934).unwrap(),
        );
        Actor::new(name, SocketFactory::new(Context::new()), config)
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        assert!(matches!(actor(""), Err(Error::InvalidName(_))));
        assert!(matches!(actor("  "), Err(Error::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_record_uses_proxy_address() {
        let actor = actor("alice").unwrap();
        let topic = Topic::wrap("d:s:t").unwrap();
        let record = actor.record(&RegInfo::subscriber(topic.clone(), "listens")).unwrap();

        assert_eq!(record.name(), "alice");
        assert_eq!(record.owner(), OwnerType::Subscriber);
        assert_eq!(record.host(), "127.0.0.1");
        assert_eq!(record.port(), 17931);
        assert_eq!(record.topic(), &topic);
        assert_eq!(record.description(), "listens");
    }

    #[tokio::test]
    async fn test_actor_ids_are_unique_topic_segments() {
        let a = actor("a").unwrap();
        let b = actor("a").unwrap();
        assert_ne!(a.id(), b.id());
        assert!(Topic::build(REPLY_DOMAIN, Some(a.id()), Some("0")).is_ok());
    }

    #[tokio::test]
    async fn test_publish_without_proxy_fails_check() {
        let factory = SocketFactory::new(Context::new());
        let setup = crate::connection::ConnectionSetup::default()
            .connection_timeout(Duration::from_millis(150));
        let config = ActorConfig::new(
            ProxyAddress::new("127.0.0.1", 17937).unwrap(),
            RegAddress::new("127.0.0.1", 17940).unwrap(),
        )
        .setup(setup);
        let actor = Actor::new("lonely", factory, config).unwrap();

        let msg = Message::from_string(Topic::wrap("t").unwrap(), "x");
        let err = actor.publish(msg).await.unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
        assert_eq!(actor.pool().idle_count(), 0);
    }
}
