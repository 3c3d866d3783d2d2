//! Client connections to a proxy

pub mod driver;
pub mod pool;
pub mod setup;

pub use driver::{subscription_prefix, ConnectionDriver, Role};
pub use pool::ConnectionPool;
pub use setup::ConnectionSetup;
