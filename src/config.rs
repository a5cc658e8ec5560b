//! TeleFS configuration
//!
//! Both endpoints resolve the server endpoint from the `server15440` and
//! `serverport15440` environment variables, falling back to loopback and
//! the default port. The server can additionally load a TOML file for the
//! knobs the environment does not cover; environment variables always win
//! over file values.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

/// Environment variable naming the server IPv4 address.
pub const ENV_SERVER_ADDR: &str = "server15440";

/// Environment variable naming the server TCP port.
pub const ENV_SERVER_PORT: &str = "serverport15440";

/// Default configuration constants
///
/// Collected in one place so both endpoints agree on limits without
/// repeating magic numbers.
pub mod defaults {
    /// Server address when `server15440` is unset.
    pub const SERVER_ADDR: &str = "127.0.0.1";

    /// Server port when `serverport15440` is unset.
    pub const SERVER_PORT: u16 = 20080;

    /// Accept backlog for the listening socket.
    pub const LISTEN_BACKLOG: i32 = 64;

    /// Upper bound on a single framed message. A declared length beyond
    /// this is treated as a malformed frame and ends the session.
    pub const MAX_MESSAGE_LEN: usize = 4 * 1024 * 1024;

    /// Default log level.
    pub const fn default_log_level() -> &'static str {
        "info"
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    defaults::SERVER_PORT
}

fn default_backlog() -> i32 {
    defaults::LISTEN_BACKLOG
}

fn default_max_message_len() -> usize {
    defaults::MAX_MESSAGE_LEN
}

fn default_log_level() -> String {
    defaults::default_log_level().to_string()
}

/// Server-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IPv4 address to bind.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Accept backlog.
    #[serde(default = "default_backlog")]
    pub backlog: i32,

    /// Per-message size limit in bytes.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            backlog: default_backlog(),
            max_message_len: default_max_message_len(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, then apply environment
    /// overrides.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("failed to read {}: {}", path, e)))?;

        let mut config: ServerConfig = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("failed to parse {}: {}", path, e)))?;

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = std::env::var(ENV_SERVER_PORT) {
            self.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "{} is not a valid port: {}",
                    ENV_SERVER_PORT, port
                ))
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr.parse::<Ipv4Addr>().map_err(|_| {
            ConfigError::ValidationError(format!("invalid bind address: {}", self.bind_addr))
        })?;

        if self.backlog <= 0 {
            return Err(ConfigError::ValidationError(
                "backlog must be positive".to_string(),
            ));
        }

        if self.max_message_len == 0 {
            return Err(ConfigError::ValidationError(
                "max_message_len must be positive".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "invalid log level: {}",
                    self.log_level
                )));
            }
        }

        Ok(())
    }

    /// The socket address to bind.
    pub fn bind_socket_addr(&self) -> SocketAddr {
        let ip: Ipv4Addr = self.bind_addr.parse().expect("validated at load time");
        SocketAddr::V4(SocketAddrV4::new(ip, self.port))
    }
}

/// Client-side configuration: where the server lives and how large a
/// response the session buffer will accept.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: Ipv4Addr,
    pub port: u16,
    pub max_message_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: defaults::SERVER_ADDR.parse().expect("literal address"),
            port: defaults::SERVER_PORT,
            max_message_len: defaults::MAX_MESSAGE_LEN,
        }
    }
}

impl ClientConfig {
    /// Resolve the server endpoint from the environment, falling back to
    /// the defaults for anything unset or unparsable. The stub runs inside
    /// arbitrary host programs, so a bad variable degrades to the default
    /// rather than failing the process.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var(ENV_SERVER_ADDR) {
            if let Ok(ip) = addr.parse() {
                config.server_addr = ip;
            }
        }
        if let Ok(port) = std::env::var(ENV_SERVER_PORT) {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        config
    }

    pub fn server_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.server_addr, self.port))
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadError(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("configuration validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 20080);
        assert_eq!(config.backlog, 64);
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_validation() {
        let mut config = ServerConfig::default();

        config.bind_addr = "not-an-ip".to_string();
        assert!(config.validate().is_err());
        config.bind_addr = "127.0.0.1".to_string();

        config.backlog = 0;
        assert!(config.validate().is_err());
        config.backlog = 64;

        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
        config.log_level = "debug".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_toml_round_trip() {
        let config = ServerConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ServerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.max_message_len, config.max_message_len);
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(config.port, 20080);
        assert_eq!(
            config.server_socket_addr().to_string(),
            "127.0.0.1:20080"
        );
    }
}
