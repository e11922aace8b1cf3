use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Complete artsync configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// OAuth client registration and platform endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Lightweight endpoint used to check that an access token is still live
    #[serde(default = "default_placebo_url")]
    pub placebo_url: String,
    /// How long the local callback listener waits for the browser redirect
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["browse".to_string(), "stash".to_string(), "publish".to_string()]
}

fn default_authorize_url() -> String {
    "https://www.deviantart.com/oauth2/authorize".to_string()
}

fn default_token_url() -> String {
    "https://www.deviantart.com/oauth2/token".to_string()
}

fn default_placebo_url() -> String {
    "https://www.deviantart.com/api/v1/oauth2/placebo".to_string()
}

fn default_callback_timeout() -> u64 {
    300
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            placebo_url: default_placebo_url(),
            callback_timeout_secs: default_callback_timeout(),
        }
    }
}

impl OAuthConfig {
    /// Scopes joined the way the platform expects them
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

/// Remote collection API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Pause between successive page requests (seconds)
    #[serde(default = "default_page_delay")]
    pub page_delay_secs: u64,
    /// Items requested per page
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

fn default_base_url() -> String {
    "https://www.deviantart.com/api/v1/oauth2".to_string()
}

fn default_page_delay() -> u64 {
    3
}

fn default_page_limit() -> u32 {
    50
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_delay_secs: default_page_delay(),
            page_limit: default_page_limit(),
        }
    }
}

impl ApiConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }
}

/// Local database settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/artsync.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl AppConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from an optional TOML file, then apply `.env` and
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };

        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DA_CLIENT_ID") {
            self.oauth.client_id = v;
        }
        if let Some(v) = lookup("DA_CLIENT_SECRET") {
            self.oauth.client_secret = v;
        }
        if let Some(v) = lookup("DA_REDIRECT_URI") {
            self.oauth.redirect_uri = v;
        }
        if let Some(v) = lookup("DA_SCOPES") {
            self.oauth.scopes = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ARTSYNC_CALLBACK_TIMEOUT_SECS") {
            self.oauth.callback_timeout_secs = parse_number("ARTSYNC_CALLBACK_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("ARTSYNC_PAGE_DELAY_SECS") {
            self.api.page_delay_secs = parse_number("ARTSYNC_PAGE_DELAY_SECS", v)?;
        }
        Ok(())
    }

    /// Check that the settings needed to talk to the platform are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("DA_CLIENT_ID"));
        }
        if self.oauth.client_secret.trim().is_empty() {
            return Err(ConfigError::Missing("DA_CLIENT_SECRET"));
        }
        if url::Url::parse(&self.oauth.redirect_uri).is_err() {
            return Err(ConfigError::Invalid {
                name: "redirect_uri",
                value: self.oauth.redirect_uri.clone(),
            });
        }
        Ok(())
    }
}

fn parse_number(name: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.oauth.redirect_uri, "http://localhost:8080/callback");
        assert_eq!(config.oauth.scope_string(), "browse stash publish");
        assert_eq!(config.oauth.callback_timeout_secs, 300);
        assert_eq!(config.api.page_delay_secs, 3);
        assert_eq!(config.api.page_limit, 50);
        assert_eq!(config.storage.database_path, PathBuf::from("data/artsync.db"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [oauth]
            client_id = "1234"
            client_secret = "secret"
            redirect_uri = "http://localhost:9090/oauth"
            scopes = ["browse", "user"]
            callback_timeout_secs = 60

            [api]
            base_url = "http://localhost:1234/api"
            page_delay_secs = 1
            page_limit = 24

            [storage]
            database_path = "/tmp/artsync.db"
        "#;

        let config = AppConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.oauth.client_id, "1234");
        assert_eq!(config.oauth.redirect_uri, "http://localhost:9090/oauth");
        assert_eq!(config.oauth.scope_string(), "browse user");
        assert_eq!(config.oauth.callback_timeout(), Duration::from_secs(60));
        assert_eq!(config.api.base_url, "http://localhost:1234/api");
        assert_eq!(config.api.page_delay(), Duration::from_secs(1));
        assert_eq!(config.api.page_limit, 24);
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/artsync.db"));
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [api]
            page_delay_secs = 5
        "#;

        let config = AppConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.api.page_delay_secs, 5);
        assert_eq!(config.api.page_limit, 50); // Default
        assert_eq!(config.oauth.token_url, "https://www.deviantart.com/oauth2/token"); // Default
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DA_CLIENT_ID", "env-id"),
            ("DA_CLIENT_SECRET", "env-secret"),
            ("DA_SCOPES", "browse  stash"),
            ("DATABASE_PATH", "/var/lib/artsync.db"),
            ("ARTSYNC_PAGE_DELAY_SECS", "7"),
        ]);

        let mut config = AppConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.oauth.client_id, "env-id");
        assert_eq!(config.oauth.client_secret, "env-secret");
        assert_eq!(config.oauth.scopes, vec!["browse", "stash"]);
        assert_eq!(config.storage.database_path, PathBuf::from("/var/lib/artsync.db"));
        assert_eq!(config.api.page_delay_secs, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_numeric_override() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|name| {
                (name == "ARTSYNC_CALLBACK_TIMEOUT_SECS").then(|| "soon".to_string())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "ARTSYNC_CALLBACK_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_requires_client_credentials() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("DA_CLIENT_ID"))
        ));

        let mut config = AppConfig::default();
        config.oauth.client_id = "id".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("DA_CLIENT_SECRET"))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/artsync.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
