//! Web server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the session and status handlers
//! - Wire up middleware (tracing, request timeout)
//! - Serve on a bound listener until shutdown is signalled

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::WebConfig;
use crate::http::handlers::{self, WebState};

/// HTTP server for the session API.
pub struct WebServer {
    router: Router,
}

impl WebServer {
    pub fn new(config: &WebConfig, state: WebState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &WebConfig, state: WebState) -> Router {
        Router::new()
            .route("/api/login", post(handlers::login))
            .route("/api/logout", post(handlers::logout))
            .route("/api/session", get(handlers::session))
            .route("/status", get(handlers::get_status))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Web server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Web server received shutdown signal");
            })
            .await?;

        tracing::info!("Web server stopped");
        Ok(())
    }
}
