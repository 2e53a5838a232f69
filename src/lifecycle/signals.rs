//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for the interrupt signal (SIGINT / ctrl-c)
//! - Hand control back to the caller, which runs `Lifecycle::stop`
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A listener that cannot be installed is treated as an immediate interrupt

/// Resolve once an interrupt is received.
pub async fn wait_for_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::debug!("signal received, stopping"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for interrupt signal"),
    }
}
