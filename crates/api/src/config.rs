use std::str::FromStr;
use std::time::Duration;

use drawbridge_broker::dispatcher::BrokerConfig;
use drawbridge_core::generation::{DEFAULT_TASK_TIMEOUT_SECS, DEFAULT_TASK_TYPE};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for both listeners (default: `0.0.0.0`).
    pub host: String,
    /// Caller-facing tool API port (default: `8081`).
    pub port: u16,
    /// Worker WebSocket port (default: `8080`).
    pub worker_port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `180`). Must exceed the
    /// task timeout, since tool calls block until their task resolves.
    pub request_timeout_secs: u64,
    /// Pending task budget in seconds (default: `120`).
    pub task_timeout_secs: u64,
    /// Seconds between background reaper passes (default: `10`).
    pub reaper_interval_secs: u64,
    /// Seconds finished tasks stay in the ledger (default: `3600`).
    pub task_retention_secs: u64,
    /// Seconds between WebSocket pings to workers (default: `30`).
    pub heartbeat_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `8081`                  |
    /// | `WORKER_PORT`             | `8080`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `180`                   |
    /// | `TASK_TIMEOUT_SECS`       | `120`                   |
    /// | `REAPER_INTERVAL_SECS`    | `10`                    |
    /// | `TASK_RETENTION_SECS`     | `3600`                  |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                    |
    ///
    /// Panics on unparseable values; misconfiguration should fail fast.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            host,
            port: env_or("PORT", 8081),
            worker_port: env_or("WORKER_PORT", 8080),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 180),
            task_timeout_secs: env_or("TASK_TIMEOUT_SECS", DEFAULT_TASK_TIMEOUT_SECS),
            reaper_interval_secs: env_or("REAPER_INTERVAL_SECS", 10),
            task_retention_secs: env_or("TASK_RETENTION_SECS", 3600),
            heartbeat_interval_secs: env_or("HEARTBEAT_INTERVAL_SECS", 30),
        };

        if config.request_timeout_secs <= config.task_timeout_secs {
            tracing::warn!(
                request_timeout_secs = config.request_timeout_secs,
                task_timeout_secs = config.task_timeout_secs,
                "Request timeout does not exceed task timeout; slow tasks will be cut off",
            );
        }

        config
    }

    /// Dispatch settings derived from this configuration.
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            task_type: DEFAULT_TASK_TYPE.to_string(),
        }
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}
