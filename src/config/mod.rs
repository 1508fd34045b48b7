use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "net-timing.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub actions: Vec<ActionOverride>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Upper bound on connection handlers running at once.
    pub max_connections: usize,
    pub io_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub server_addr: String,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
}

/// Replaces the command behind one of the catalog's command slots.
#[derive(Debug, Deserialize, Clone)]
pub struct ActionOverride {
    pub code: u8,
    pub command: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            max_connections: 256,
            io_timeout_ms: 30_000,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:5000".to_string(),
            connect_timeout_ms: 5_000,
            response_timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like `from_file`, but a missing file just means "use the defaults".
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.listen_addr.port(), 5000);
        assert_eq!(config.server.max_connections, 256);
        assert_eq!(config.client.server_addr, "127.0.0.1:5000");
        assert!(config.actions.is_empty());
    }

    #[test]
    fn partial_sections_and_overrides() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen_addr = "127.0.0.1:7000"

            [client]
            response_timeout_ms = 250

            [[actions]]
            code = 4
            command = "ss -tan"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen_addr.port(), 7000);
        assert_eq!(config.server.io_timeout(), Duration::from_secs(30));
        assert_eq!(config.client.response_timeout(), Duration::from_millis(250));
        assert_eq!(config.client.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.actions.len(), 1);
        assert_eq!(config.actions[0].code, 4);
        assert_eq!(config.actions[0].command, "ss -tan");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default("definitely/not/here.toml").unwrap();
        assert_eq!(config.server.max_connections, 256);
    }
}
