//! Topic-addressed actor messaging
//!
//! Actors exchange multi-frame messages through a forwarding proxy and
//! find each other through a registrar.
//!
//! ```text
//!                 ┌──────────── Proxy ────────────┐
//!   publishers ──►│ frontend ─► switch ─► backend │──► subscribers
//!                 │        └─► controller ◄─┘     │
//!                 └──────────────┬────────────────┘
//!                                └── router ──► handshake replies
//!
//!   actors ── register / discover ──► Registrar ── publishers / subscribers databases
//! ```
//!
//! # Example
//!
//! ```no_run
//! use actorbus::{Actor, ActorConfig, Context, Message, SocketFactory, Topic};
//!
//! # async fn demo() -> actorbus::Result<()> {
//! let factory = SocketFactory::new(Context::new());
//! let actor = Actor::new("printer", factory, ActorConfig::default())?;
//!
//! let topic = Topic::build("sensors", Some("kitchen"), None)?;
//! let subscription = actor
//!     .subscribe(topic.clone(), |msg: Message| async move {
//!         println!("{:?}", msg.as_string());
//!     })
//!     .await?;
//!
//! actor.publish(Message::from_string(topic, "21.5")).await?;
//! actor.unsubscribe(subscription).await;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod address;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod proxy;
pub mod registration;
pub mod stats;
pub mod topic;
pub mod transport;
mod wire;

pub use actor::{Actor, ActorConfig, Callback, Subscription};
pub use address::{ProxyAddress, RegAddress};
pub use config::EnvSettings;
pub use connection::{ConnectionDriver, ConnectionPool, ConnectionSetup, Role};
pub use error::{DecodeError, Error, HandshakeError, Result};
pub use message::{Message, Meta};
pub use proxy::{Proxy, ProxyConfig, ProxyHandle};
pub use registration::{
    OwnerType, RegInfo, RegQuery, RegistrarConfig, RegistrarDriver, RegistrarService,
    RegistrationDatabase, RegistrationRecord,
};
pub use topic::Topic;
pub use transport::{Context, SocketFactory};
