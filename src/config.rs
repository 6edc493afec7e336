//! Server configuration, read from environment variables.

/// Runtime knobs with sensible defaults for local play.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port for the HTTP/WebSocket listener.
    pub port: u16,
    /// How long a fully-disconnected room survives before teardown.
    pub cleanup_grace_secs: u64,
    /// Duration of the reveal pacing state between voting and the next round.
    pub reveal_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            cleanup_grace_secs: 5 * 60,
            reveal_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: read_env("IMPOSTOR_PORT", defaults.port),
            cleanup_grace_secs: read_env("IMPOSTOR_CLEANUP_GRACE_SECS", defaults.cleanup_grace_secs),
            reveal_secs: read_env("IMPOSTOR_REVEAL_SECS", defaults.reveal_secs),
        }
    }
}

fn read_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("Invalid value for {}, using default", name);
            default
        }
    }
}
