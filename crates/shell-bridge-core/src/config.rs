//! Bridge configuration.
//!
//! Loaded from an optional TOML file named by `SHELL_BRIDGE_CONFIG`,
//! then overridden by environment variables.

use std::{fs, net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::{CredentialRef, RemoteTarget, TerminalGeometry};

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "SHELL_BRIDGE_CONFIG";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the HTTP/WebSocket server binds to.
    pub listen_addr: SocketAddr,
    /// Remote host settings.
    pub remote: RemoteConfig,
    /// Pseudo-terminal geometry.
    pub terminal: TerminalGeometry,
    /// Per-session settings.
    pub session: SessionConfig,
    /// Logging and tracing.
    pub telemetry: TelemetryConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            remote: RemoteConfig::default(),
            terminal: TerminalGeometry::default(),
            session: SessionConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Remote host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Where shells are opened.
    #[serde(flatten)]
    pub target: RemoteTarget,
    /// Upper bound on opening the remote session.
    pub connect_timeout_secs: u64,
    /// SSH client executable.
    pub ssh_program: String,
    /// Extra client options, shell-quoted.
    pub ssh_options: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            target: RemoteTarget::default(),
            connect_timeout_secs: 15,
            ssh_program: "ssh".to_string(),
            ssh_options: String::new(),
        }
    }
}

impl RemoteConfig {
    /// Connect timeout as a duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Per-session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Read buffer for remote output.
    pub chunk_size: usize,
    /// How long to wait for a first client message carrying a trace
    /// carrier. `None` waits indefinitely.
    pub prime_window_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            prime_window_ms: Some(500),
        }
    }
}

impl SessionConfig {
    /// Priming window as a duration.
    #[must_use]
    pub fn prime_window(&self) -> Option<Duration> {
        self.prime_window_ms.map(Duration::from_millis)
    }
}

/// Logging and tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Export spans through OpenTelemetry.
    pub enable_otel: bool,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// Default filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_otel: false,
            service_name: "shell-bridge".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns error if the config file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// # Errors
    /// Same as [`BridgeConfig::load`].
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment overrides.
    ///
    /// # Errors
    /// Returns error if a numeric or address override does not parse.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("SHELL_BRIDGE_LISTEN") {
            self.listen_addr = parse_value("SHELL_BRIDGE_LISTEN", &addr)?;
        }
        if let Some(host) = lookup("REMOTE_HOSTNAME") {
            self.remote.target.host = host;
        }
        if let Some(user) = lookup("REMOTE_USERNAME") {
            self.remote.target.username = user;
        }
        if let Some(port) = lookup("REMOTE_PORT") {
            self.remote.target.port = parse_value("REMOTE_PORT", &port)?;
        }
        if let Some(key) = lookup("REMOTE_KEY_PATH") {
            self.remote.target.credential = CredentialRef::KeyFile(PathBuf::from(key));
        }
        if let Some(flag) = lookup("ENABLE_OTEL") {
            self.telemetry.enable_otel = flag == "1";
        }
        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns error on an unusable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.chunk_size == 0 {
            return Err(ConfigError::Invalid("session.chunk_size must be > 0".into()));
        }
        if self.terminal.cols == 0 || self.terminal.rows == 0 {
            return Err(ConfigError::Invalid("terminal geometry must be non-zero".into()));
        }
        if self.remote.ssh_program.trim().is_empty() {
            return Err(ConfigError::Invalid("remote.ssh_program is empty".into()));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::load_with(lookup(&[])).unwrap();
        assert_eq!(config.remote.target.port, 22);
        assert_eq!(config.session.chunk_size, 4096);
        assert_eq!(config.session.prime_window(), Some(Duration::from_millis(500)));
        assert!(!config.telemetry.enable_otel);
    }

    #[test]
    fn test_env_overrides() {
        let config = BridgeConfig::load_with(lookup(&[
            ("REMOTE_HOSTNAME", "ec2.example.com"),
            ("REMOTE_USERNAME", "ubuntu"),
            ("REMOTE_PORT", "2222"),
            ("REMOTE_KEY_PATH", "/keys/aws.pem"),
            ("ENABLE_OTEL", "1"),
            ("SHELL_BRIDGE_LISTEN", "0.0.0.0:9000"),
        ]))
        .unwrap();

        assert_eq!(config.remote.target.destination(), "ubuntu@ec2.example.com");
        assert_eq!(config.remote.target.port, 2222);
        assert_eq!(
            config.remote.target.credential,
            CredentialRef::KeyFile(PathBuf::from("/keys/aws.pem"))
        );
        assert!(config.telemetry.enable_otel);
        assert_eq!(config.listen_addr.port(), 9000);
    }

    #[test]
    fn test_bad_port_override() {
        let err = BridgeConfig::load_with(lookup(&[("REMOTE_PORT", "ssh")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "REMOTE_PORT", .. }));
    }

    #[test]
    fn test_toml_sections() {
        let config: BridgeConfig = toml::from_str(
            r#"
            listen_addr = "0.0.0.0:8080"

            [remote]
            host = "10.0.0.5"
            username = "admin"
            credential = "agent"
            connect_timeout_secs = 5

            [session]
            prime_window_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.target.host, "10.0.0.5");
        assert_eq!(config.remote.target.credential, CredentialRef::Agent);
        assert_eq!(config.remote.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.session.chunk_size, 4096);
        assert_eq!(config.terminal.term_type, "vt100");
    }

    #[test]
    fn test_missing_file() {
        let err = BridgeConfig::load_with(lookup(&[(CONFIG_PATH_ENV, "/nonexistent.toml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let mut config = BridgeConfig::default();
        config.session.chunk_size = 0;
        assert!(config.validate().is_err());
    }
}
