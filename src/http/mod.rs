//! HTTP surface over the session store.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace + timeout layers)
//!     → handlers.rs (login, logout, session, status)
//!     → SessionStore (cookie in, Set-Cookie out)
//! ```

pub mod handlers;
pub mod server;

pub use handlers::{Credentials, WebState, ADMIN_USER_ID};
pub use server::WebServer;
