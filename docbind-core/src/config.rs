//! Connection configuration.
//!
//! Configurations are plain serde types so they can be loaded from any serde
//! format. [`InitConfig`] accepts either a single configuration (the primary
//! connection) or an ordered list of named configurations:
//!
//! ```ignore
//! use docbind::config::InitConfig;
//!
//! let primary = InitConfig::from_json_str(r#"{ "host": "mongodb://localhost:27017/shop" }"#)?;
//! let tenants = InitConfig::from_json_str(r#"[
//!     { "id": "eu", "host": "mongodb://eu.internal/shop", "username": "svc", "password": "..." },
//!     { "id": "us", "host": "mongodb://us.internal/shop" }
//! ]"#)?;
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Paths to TLS material. The files are read when the connection is
/// established; an unreadable file fails initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub ca_file: PathBuf,
    #[serde(default)]
    pub cert_key_file: Option<PathBuf>,
}

/// TLS material loaded from a [`TlsConfig`].
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub ca: Vec<u8>,
    pub cert_key: Option<Vec<u8>>,
}

impl TlsConfig {
    pub fn load(&self) -> DocumentStoreResult<TlsMaterial> {
        let read = |path: &PathBuf| {
            fs::read(path).map_err(|e| {
                DocumentStoreError::Initialization(format!(
                    "cannot read TLS file {}: {e}",
                    path.display()
                ))
            })
        };

        Ok(TlsMaterial {
            ca: read(&self.ca_file)?,
            cert_key: self
                .cert_key_file
                .as_ref()
                .map(read)
                .transpose()?,
        })
    }
}

/// Settings for one connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Scope id for named connections; `None` for the primary connection.
    #[serde(default)]
    pub id: Option<String>,
    pub host: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            id: None,
            host: host.into(),
            username: None,
            password: None,
            tls: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}

// Hand-written so the password never ends up in logs.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// The argument of [`ConnectionRegistry::init`](crate::registry::ConnectionRegistry::init).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitConfig {
    /// The primary connection; binds globally registered datastores.
    Single(ConnectionConfig),
    /// Named connections; each binds the datastores registered under its id.
    Many(Vec<ConnectionConfig>),
}

impl InitConfig {
    pub fn from_json_str(json: &str) -> DocumentStoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<ConnectionConfig> for InitConfig {
    fn from(config: ConnectionConfig) -> Self {
        InitConfig::Single(config)
    }
}

impl From<Vec<ConnectionConfig>> for InitConfig {
    fn from(configs: Vec<ConnectionConfig>) -> Self {
        InitConfig::Many(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_list_forms() {
        let single = InitConfig::from_json_str(r#"{ "host": "mem://a", "username": "u", "password": "p" }"#).unwrap();
        assert_eq!(
            single,
            InitConfig::Single(ConnectionConfig::new("mem://a").with_credentials("u", "p"))
        );

        let many = InitConfig::from_json_str(r#"[{ "id": "eu", "host": "mem://eu" }, { "id": "us", "host": "mem://us" }]"#).unwrap();
        match many {
            InitConfig::Many(configs) => {
                assert_eq!(configs.len(), 2);
                assert_eq!(configs[1].id.as_deref(), Some("us"));
            }
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[test]
    fn debug_hides_password() {
        let config = ConnectionConfig::new("mem://a").with_credentials("u", "secret");

        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn missing_tls_file_is_an_initialization_error() {
        let tls = TlsConfig {
            ca_file: PathBuf::from("/definitely/not/here/ca.pem"),
            cert_key_file: None,
        };

        assert!(matches!(tls.load(), Err(DocumentStoreError::Initialization(_))));
    }
}
