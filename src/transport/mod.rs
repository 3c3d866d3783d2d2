//! Message transport
//!
//! A small socket layer over tokio TCP carrying multi-frame messages.
//!
//! ```text
//!   connecting sockets            bound sockets
//!   ──────────────────            ─────────────
//!   PubSocket    ──────────────►  proxy frontend (fan-in)
//!   SubSocket    ◄──────────────  proxy backend  (fan-out, prefix filtered)
//!   DealerSocket ◄──────────────  RouterSocket   (routed by identity)
//!   ReqSocket    ◄─────────────►  RepSocket      (one reply per request)
//! ```
//!
//! Connecting sockets connect lazily and reconnect on their own; bound
//! sockets fail fast when their port is taken. All sockets are created
//! through a [`SocketFactory`] bound to a [`Context`].

pub mod bound;
pub mod codec;
pub mod context;
pub mod factory;
pub mod link;
pub(crate) mod listener;

pub use bound::{RepSocket, Request, RouterSocket};
pub use codec::{Packet, PacketCodec, SocketKind};
pub use context::Context;
pub use factory::{SocketConfig, SocketFactory};
pub use link::{DealerSocket, PubSocket, ReqSocket, SubSocket};
