//! DDNS service core: lifecycle orchestration and authenticated sessions.

pub mod app;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod session;

pub use config::schema::DdnsConfig;
pub use lifecycle::{Key, Lifecycle, LifecycleState};
pub use session::SessionStore;
