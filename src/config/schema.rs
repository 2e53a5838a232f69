//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the ddns daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DdnsConfig {
    /// Process-level switches (which subsystems are wired).
    pub server: ServerConfig,

    /// Web surface (admin credentials, bind address).
    pub web: WebConfig,

    /// Session store selection and cookie lifetime.
    pub session: SessionConfig,

    /// Connection parameters for the redis session backend.
    pub redis: RedisConfig,

    /// Startup/shutdown tuning.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Process-level switches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Wire the web subsystem.
    pub enable_web: bool,

    /// Start the time-bounded CPU/memory diagnostics capture.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enable_web: true,
            debug: false,
        }
    }
}

/// Web surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// Administrator login name. The web subsystem refuses to start when empty.
    pub admin: String,

    /// Administrator password. The web subsystem refuses to start when empty.
    pub passwd: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9000".to_string(),
            admin: String::new(),
            passwd: String::new(),
            request_timeout_secs: 30,
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backend name: "memory" or "redis".
    pub backend: String,

    /// Cookie and record lifetime in seconds.
    pub maxage: i64,

    /// Interval of the memory backend's expiry sweeper in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            maxage: 3600,
            sweep_interval_secs: 60,
        }
    }
}

/// Redis connection parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// "host:port" of the redis server.
    pub host: String,

    /// Password, empty for none.
    pub passwd: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:6379".to_string(),
            passwd: String::new(),
        }
    }
}

/// Lifecycle tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Default time budget for each stop hook, in seconds.
    pub stop_timeout_secs: u64,

    /// Stop hook order: "lifo" (reverse registration) or "fifo".
    pub stop_order: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 10,
            stop_order: "lifo".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
