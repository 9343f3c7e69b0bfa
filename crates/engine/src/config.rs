// Engine server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The WebSocket heartbeat constants live with the ws module;
// this covers the core server settings.

use std::net::SocketAddr;
use std::time::Duration;

/// Core engine server configuration.
///
/// Constructed via [`EngineConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Base URL for WebSocket connections (e.g. `ws://localhost:8080`).
    pub ws_base_url: String,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `maplive_engine=debug`).
    pub log_filter: String,
    /// How long a session may sit with no connected participants before
    /// the sweeper drops it.
    pub idle_session_ttl: Duration,
    /// How often the idle-session sweeper runs.
    pub sweep_interval: Duration,
}

impl EngineConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `MAPLIVE_HOST` | `0.0.0.0` |
    /// | `MAPLIVE_PORT` | `8080` |
    /// | `MAPLIVE_WS_BASE_URL` | `ws://{host}:{port}` |
    /// | `MAPLIVE_CORS_ORIGINS` | *(none — dev defaults)* |
    /// | `MAPLIVE_LOG_FILTER` | `info` |
    /// | `MAPLIVE_IDLE_SESSION_TTL_SECS` | `3600` |
    /// | `MAPLIVE_SWEEP_INTERVAL_SECS` | `300` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("MAPLIVE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("MAPLIVE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let ws_base_url =
            env("MAPLIVE_WS_BASE_URL").unwrap_or_else(|_| format!("ws://{listen_addr}"));

        let cors_origins = env("MAPLIVE_CORS_ORIGINS").ok();

        let log_filter = env("MAPLIVE_LOG_FILTER").unwrap_or_else(|_| "info".into());

        let idle_session_ttl = Duration::from_secs(
            env("MAPLIVE_IDLE_SESSION_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(3600),
        );
        let sweep_interval = Duration::from_secs(
            env("MAPLIVE_SWEEP_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
        );

        Self { listen_addr, ws_base_url, cors_origins, log_filter, idle_session_ttl, sweep_interval }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(map: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_env_empty() {
        let config = EngineConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.ws_base_url, format!("ws://{}", config.listen_addr));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.idle_session_ttl, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = EngineConfig::from_env_fn(env_from_map(HashMap::from([
            ("MAPLIVE_HOST", "127.0.0.1"),
            ("MAPLIVE_PORT", "9100"),
            ("MAPLIVE_WS_BASE_URL", "wss://live.example.com"),
            ("MAPLIVE_LOG_FILTER", "maplive_engine=debug"),
            ("MAPLIVE_IDLE_SESSION_TTL_SECS", "60"),
            ("MAPLIVE_SWEEP_INTERVAL_SECS", "5"),
        ])));
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:9100");
        assert_eq!(config.ws_base_url, "wss://live.example.com");
        assert_eq!(config.log_filter, "maplive_engine=debug");
        assert_eq!(config.idle_session_ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn unparseable_port_falls_back_to_default() {
        let config =
            EngineConfig::from_env_fn(env_from_map(HashMap::from([("MAPLIVE_PORT", "not-a-port")])));
        assert_eq!(config.listen_addr.port(), 8080);
    }
}
