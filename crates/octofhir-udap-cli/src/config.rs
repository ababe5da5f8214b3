//! `udap` CLI configuration.
//!
//! Loaded from an optional TOML file (default `udap.toml`) followed by
//! environment overrides such as `UDAP__LOGGING__LEVEL=debug`.
//!
//! ```toml
//! default_client = "b2b"
//!
//! [http]
//! timeout = "30s"
//!
//! [[clients]]
//! nickname = "b2b"
//! client_name = "Example B2B Client"
//! grant_types = ["client_credentials"]
//! scopes = ["system/Patient.read"]
//! certificate_path = "certs/client.pem"
//! private_key_path = "certs/client.key"
//! server = "https://fhir.example.com/r4"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use octofhir_udap::ClientIdentity;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "udap.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "UDAP";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("config file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("invalid client '{name}': {message}")]
    InvalidClient { name: String, message: String },

    #[error("duplicate client nickname '{0}'")]
    DuplicateClient(String),

    #[error("unknown client '{0}'")]
    UnknownClient(String),

    #[error("no clients configured")]
    NoClients,

    #[error("{0} clients configured; choose one with --client or default_client")]
    AmbiguousClient(usize),

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Nickname of the client used when `--client` is not given.
    pub default_client: Option<String>,
    pub clients: Vec<ClientProfile>,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// A client identity together with the files holding its key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
    #[serde(flatten)]
    pub identity: ClientIdentity,

    /// PEM certificate chain, leaf first.
    pub certificate_path: PathBuf,

    /// PEM private key (PKCS#1, SEC1 or PKCS#8).
    pub private_key_path: PathBuf,

    /// FHIR base URL used when `--server` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Url>,

    /// Expected metadata issuer when it differs from the base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl ClientProfile {
    /// Name used to select the profile: the nickname, else the client name.
    pub fn name(&self) -> &str {
        self.identity
            .nickname
            .as_deref()
            .unwrap_or(&self.identity.client_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl CliConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "http.timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.level",
                message: "must not be empty".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for client in &self.clients {
            if !seen.insert(client.name()) {
                return Err(ConfigError::DuplicateClient(client.name().to_string()));
            }
            client
                .identity
                .validate()
                .map_err(|e| ConfigError::InvalidClient {
                    name: client.name().to_string(),
                    message: e.to_string(),
                })?;
        }

        if let Some(default) = &self.default_client
            && !seen.contains(default.as_str())
        {
            return Err(ConfigError::UnknownClient(default.clone()));
        }
        Ok(())
    }

    /// Picks the client to act as.
    ///
    /// Resolution order: the `--client` flag, then `default_client`, then
    /// the only configured client.
    pub fn resolve_client(&self, flag: Option<&str>) -> Result<&ClientProfile, ConfigError> {
        if let Some(name) = flag.or(self.default_client.as_deref()) {
            return self
                .clients
                .iter()
                .find(|c| c.name() == name)
                .ok_or_else(|| ConfigError::UnknownClient(name.to_string()));
        }
        match self.clients.as_slice() {
            [] => Err(ConfigError::NoClients),
            [only] => Ok(only),
            many => Err(ConfigError::AmbiguousClient(many.len())),
        }
    }
}

/// Loads the configuration.
///
/// An explicit `path` must exist; without one, `udap.toml` in the working
/// directory is used if present.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let mut builder = Config::builder();
    match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::MissingFile {
                    path: p.to_path_buf(),
                });
            }
            builder = builder.add_source(File::from(p.to_path_buf()));
        }
        None => {
            builder =
                builder.add_source(File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false));
        }
    }
    // e.g. UDAP__HTTP__TIMEOUT=30s
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__"),
    );

    let merged: CliConfig = builder.build()?.try_deserialize()?;
    merged.validate()?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use octofhir_udap::GrantType;

    use super::*;

    fn profile(nickname: &str) -> ClientProfile {
        ClientProfile {
            identity: ClientIdentity::new("Example", vec![GrantType::ClientCredentials])
                .with_nickname(nickname),
            certificate_path: PathBuf::from("client.pem"),
            private_key_path: PathBuf::from("client.key"),
            server: None,
            issuer: None,
        }
    }

    #[test]
    fn test_resolve_client_order() {
        let config = CliConfig {
            default_client: Some("b".to_string()),
            clients: vec![profile("a"), profile("b")],
            ..Default::default()
        };
        assert_eq!(config.resolve_client(Some("a")).unwrap().name(), "a");
        assert_eq!(config.resolve_client(None).unwrap().name(), "b");
        assert!(matches!(
            config.resolve_client(Some("c")),
            Err(ConfigError::UnknownClient(_))
        ));
    }

    #[test]
    fn test_resolve_sole_client() {
        let mut config = CliConfig::default();
        assert!(matches!(config.resolve_client(None), Err(ConfigError::NoClients)));

        config.clients.push(profile("only"));
        assert_eq!(config.resolve_client(None).unwrap().name(), "only");

        config.clients.push(profile("other"));
        assert!(matches!(
            config.resolve_client(None),
            Err(ConfigError::AmbiguousClient(2))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_unknown_default() {
        let config = CliConfig {
            clients: vec![profile("a"), profile("a")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateClient(_))));

        let config = CliConfig {
            default_client: Some("missing".to_string()),
            clients: vec![profile("a")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnknownClient(_))));
    }

    #[test]
    fn test_validate_rejects_invalid_identity() {
        let mut bad = profile("a");
        bad.identity.auth_token_ttl = Duration::from_secs(600);
        let config = CliConfig {
            clients: vec![bad],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidClient { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = CliConfig::default();
        config.http.timeout = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "http.timeout", .. })
        ));
    }
}
