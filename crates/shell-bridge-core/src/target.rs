//! Remote target and terminal geometry.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::traits::RemoteError;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Reference to the credential used to authenticate.
///
/// The bridge never reads key material itself; it only hands the
/// reference to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRef {
    /// Private key file.
    KeyFile(PathBuf),
    /// Whatever the local SSH agent offers.
    Agent,
}

impl CredentialRef {
    /// Default key file under the user's home directory.
    #[must_use]
    pub fn default_key_file() -> Self {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ssh")
            .join("id_rsa");
        Self::KeyFile(path)
    }
}

/// Host the bridge opens shells on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteTarget {
    /// Host name or address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Credential reference.
    pub credential: CredentialRef,
}

impl Default for RemoteTarget {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_SSH_PORT,
            username: "root".to_string(),
            credential: CredentialRef::default_key_file(),
        }
    }
}

impl RemoteTarget {
    /// Create a target authenticated with a key file.
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>, key: PathBuf) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            credential: CredentialRef::KeyFile(key),
        }
    }

    /// Override the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@host` destination string.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// Check the target before any connection attempt.
    ///
    /// # Errors
    /// Returns error for an empty host or user, port 0, or a missing key file.
    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.host.trim().is_empty() {
            return Err(RemoteError::Network("Host cannot be empty".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(RemoteError::Auth("Username cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(RemoteError::Network("Port cannot be 0".to_string()));
        }
        if let CredentialRef::KeyFile(path) = &self.credential {
            if !path.is_file() {
                return Err(RemoteError::Credential(format!(
                    "SSH key file not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Pseudo-terminal geometry requested for the remote shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalGeometry {
    /// Columns.
    pub cols: u16,
    /// Rows.
    pub rows: u16,
    /// Value of `TERM` on the remote side.
    pub term_type: String,
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            term_type: "vt100".to_string(),
        }
    }
}
