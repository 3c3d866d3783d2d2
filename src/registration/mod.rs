//! Registration and discovery
//!
//! Actors register the topics they publish or subscribe to with a
//! registrar, and discover each other by querying it.
//!
//! ```text
//!   Actor ── RegistrarDriver ──req/rep──► RegistrarService
//!                                            ├── publishers:  RegistrationDatabase
//!                                            └── subscribers: RegistrationDatabase
//! ```

pub mod database;
pub mod driver;
mod protocol;
pub mod query;
pub mod record;
pub mod service;

pub use database::RegistrationDatabase;
pub use driver::{RegistrarDriver, DEFAULT_REQUEST_TIMEOUT};
pub use query::{QueryBuilder, QueryKind, RegFilter, RegInfo, RegQuery};
pub use record::{OwnerType, RegistrationRecord};
pub use service::{RegistrarConfig, RegistrarHandle, RegistrarService, ServiceState};
