//! Configuration manager for bazaar.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_PORT: u16 = 8888;
/// 24 hours.
pub const DEFAULT_TOKEN_LIFETIME: u64 = 60 * 60 * 24;
/// One year.
pub const MAX_TOKEN_LIFETIME: u64 = 60 * 60 * 24 * 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to session token configuration.
    #[serde(default, skip_serializing)]
    pub token: Token,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// First administrator provisioned on start.
    #[serde(skip_serializing)]
    pub admin: Option<Admin>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: "bazaar".into(),
            url: "http://localhost".into(),
            port: DEFAULT_PORT,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            token: Token::default(),
            argon2: None,
            admin: None,
        }
    }
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Session token configuration.
///
/// The signing secret is read from `TOKEN_SECRET`, never from this file.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Seconds between issuance and expiry.
    pub lifetime: u64,
    /// Update token audience.
    /// Default is the instance URL.
    pub audience: Option<String>,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            lifetime: DEFAULT_TOKEN_LIFETIME,
            audience: None,
        }
    }
}

/// Bootstrap administrator. Password is read from `ADMIN_PASSWORD`.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub email: String,
    pub phone: String,
}

/// Configuration cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("token lifetime must be between 1 and {MAX_TOKEN_LIFETIME} seconds")]
    TokenLifetime,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        let file_path: &Path = if self.path.is_file() {
            &self.path
        } else {
            Path::new(DEFAULT_CONFIG_PATH)
        };

        match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader(file) {
                Ok(config) => Ok(Arc::new(self.finalize(config)?)),
                Err(err) => Ok(Arc::new(self.error(err))),
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        match serde_yaml::from_str(yaml) {
            Ok(config) => Self::default().finalize(config),
            Err(err) => Ok(Self::default().error(err)),
        }
    }

    fn finalize(&self, mut config: Configuration) -> Result<Self, ConfigError> {
        // set app version.
        config.version = VERSION.to_owned();
        config.url = self.normalize_url(&config.url)?;

        if !(1..=MAX_TOKEN_LIFETIME).contains(&config.token.lifetime) {
            return Err(ConfigError::TokenLifetime);
        }

        Ok(config)
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` cannot be used, falling back to defaults");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let config = Configuration::from_yaml(
            r#"
name: farm market
url: market.example.com
token:
  lifetime: 3600
argon2:
  memory_cost: 1024
  iterations: 1
  parallelism: 1
  hash_length: 32
admin:
  email: root@market.example.com
  phone: "+33612345678"
"#,
        )
        .unwrap();

        assert_eq!(config.name, "farm market");
        assert_eq!(config.url, "https://market.example.com/");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.token.lifetime, 3600);
        assert_eq!(config.argon2.unwrap().memory_cost, 1024);
        assert_eq!(config.admin.unwrap().phone, "+33612345678");
        assert_eq!(config.version, VERSION);
    }

    #[test]
    fn test_default_token_lifetime() {
        let config =
            Configuration::from_yaml("name: market\nurl: http://localhost\n")
                .unwrap();
        assert_eq!(config.token.lifetime, DEFAULT_TOKEN_LIFETIME);
        assert_eq!(config.url, "http://localhost/");
    }

    #[test]
    fn test_zero_lifetime_is_rejected() {
        let err = Configuration::from_yaml(
            "name: market\nurl: localhost\ntoken:\n  lifetime: 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::TokenLifetime));
    }

    #[test]
    fn test_oversized_lifetime_is_rejected() {
        let err = Configuration::from_yaml(
            "name: market\nurl: localhost\ntoken:\n  lifetime: 18446744073709551615\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::TokenLifetime));

        let config = Configuration::from_yaml(&format!(
            "name: market\nurl: localhost\ntoken:\n  lifetime: {MAX_TOKEN_LIFETIME}\n"
        ))
        .unwrap();
        assert_eq!(config.token.lifetime, MAX_TOKEN_LIFETIME);
    }

    #[test]
    fn test_malformed_yaml_falls_back() {
        let config = Configuration::from_yaml("name: [unclosed").unwrap();
        assert_eq!(config, Configuration::default());
    }
}
