//! Configuration management for passport-spa
//!
//! This module handles loading, parsing, validating, and defaulting the
//! client options from YAML files and environment variables.

use crate::error::{PassportError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Seconds to wait on a silent authorization before bailing
pub const DEFAULT_AUTHORIZE_TIMEOUT_IN_SECONDS: u64 = 20;

/// Seconds subtracted from a token's claimed expiry to absorb clock skew
pub const DEFAULT_LEEWAY: i64 = 10;

/// Path prefix for every endpoint on the authorization server
pub const DEFAULT_OAUTH_PREFIX: &str = "oauth";

/// Scope requested when none is given; also the catch-all scope token
pub const DEFAULT_SCOPE: &str = "*";

/// Whether `get_token` signs in again when the cached token is unusable
pub const DEFAULT_AUTO_REFRESH: bool = true;

/// Prefix for correlation entries in the key-value store
pub const DEFAULT_STORAGE_PREFIX: &str = "lpjs.";

/// Options for a [`PassportClient`](crate::auth::session::PassportClient)
///
/// `domain`, `client_id` and `redirect_uri` are mandatory; everything else
/// falls back to the constants in this module. Both snake_case and the
/// camelCase spellings used by browser clients are accepted in YAML.
///
/// # Examples
///
/// ```
/// use passport_spa::config::ClientOptions;
///
/// let yaml = r#"
/// domain: login.example.com
/// client_id: "3"
/// redirect_uri: https://app.example.com/callback
/// oauthPrefix: passport
/// "#;
/// let options: ClientOptions = serde_yaml::from_str(yaml).unwrap();
/// assert_eq!(options.oauth_prefix, "passport");
/// assert_eq!(options.scope, "*");
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Authorization server domain, e.g. `login.example.com`
    #[serde(default)]
    pub domain: String,

    /// OAuth client identifier
    #[serde(default)]
    pub client_id: String,

    /// Where the authorization server sends the browser back to
    #[serde(default)]
    pub redirect_uri: String,

    /// Route prefix of the OAuth endpoints on the server
    #[serde(default = "default_oauth_prefix", alias = "oauthPrefix")]
    pub oauth_prefix: String,

    /// Scope requested when `sign_in` is called without one
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Clock-skew margin in seconds
    #[serde(default = "default_leeway")]
    pub leeway: i64,

    /// Silent authorization budget in seconds
    #[serde(
        default = "default_authorize_timeout",
        alias = "authorizeTimeoutInSeconds"
    )]
    pub authorize_timeout_in_seconds: u64,

    /// Whether `get_token` triggers a sign-in on a missing or expired token
    #[serde(default = "default_auto_refresh", alias = "isAutoRefresh")]
    pub is_auto_refresh: bool,

    /// Key prefix for correlation entries
    #[serde(default = "default_storage_prefix", alias = "storagePrefix")]
    pub storage_prefix: String,
}

fn default_oauth_prefix() -> String {
    DEFAULT_OAUTH_PREFIX.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_leeway() -> i64 {
    DEFAULT_LEEWAY
}

fn default_authorize_timeout() -> u64 {
    DEFAULT_AUTHORIZE_TIMEOUT_IN_SECONDS
}

fn default_auto_refresh() -> bool {
    DEFAULT_AUTO_REFRESH
}

fn default_storage_prefix() -> String {
    DEFAULT_STORAGE_PREFIX.to_string()
}

impl ClientOptions {
    /// Create options from the three mandatory values, defaulting the rest
    ///
    /// # Examples
    ///
    /// ```
    /// use passport_spa::config::ClientOptions;
    ///
    /// let options = ClientOptions::new("login.example.com", "1", "https://app.example.com/cb");
    /// assert_eq!(options.leeway, 10);
    /// assert_eq!(options.authorize_timeout_in_seconds, 20);
    /// assert!(options.is_auto_refresh);
    /// ```
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            oauth_prefix: default_oauth_prefix(),
            scope: default_scope(),
            leeway: default_leeway(),
            authorize_timeout_in_seconds: default_authorize_timeout(),
            is_auto_refresh: default_auto_refresh(),
            storage_prefix: default_storage_prefix(),
        }
    }

    /// Load options from file and environment
    ///
    /// The file is optional; when it does not exist the options start empty
    /// and must be completed by environment variables.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a YAML options file
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str) -> Result<Self> {
        let mut options = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using environment only", path);
            Self::new("", "", "")
        };

        options.apply_env_vars();

        Ok(options)
    }

    /// Parse options from a YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PassportError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PassportError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(domain) = std::env::var("PASSPORT_SPA_DOMAIN") {
            self.domain = domain;
        }

        if let Ok(client_id) = std::env::var("PASSPORT_SPA_CLIENT_ID") {
            self.client_id = client_id;
        }

        if let Ok(redirect_uri) = std::env::var("PASSPORT_SPA_REDIRECT_URI") {
            self.redirect_uri = redirect_uri;
        }

        if let Ok(prefix) = std::env::var("PASSPORT_SPA_OAUTH_PREFIX") {
            self.oauth_prefix = prefix;
        }

        if let Ok(scope) = std::env::var("PASSPORT_SPA_SCOPE") {
            self.scope = scope;
        }

        if let Ok(leeway) = std::env::var("PASSPORT_SPA_LEEWAY") {
            if let Ok(value) = leeway.parse() {
                self.leeway = value;
            } else {
                tracing::warn!("Invalid PASSPORT_SPA_LEEWAY: {}", leeway);
            }
        }

        if let Ok(timeout) = std::env::var("PASSPORT_SPA_AUTHORIZE_TIMEOUT") {
            if let Ok(value) = timeout.parse() {
                self.authorize_timeout_in_seconds = value;
            } else {
                tracing::warn!("Invalid PASSPORT_SPA_AUTHORIZE_TIMEOUT: {}", timeout);
            }
        }

        if let Ok(auto_refresh) = std::env::var("PASSPORT_SPA_AUTO_REFRESH") {
            match auto_refresh.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.is_auto_refresh = true,
                "false" | "0" | "no" => self.is_auto_refresh = false,
                _ => tracing::warn!("Invalid PASSPORT_SPA_AUTO_REFRESH: {}", auto_refresh),
            }
        }
    }

    /// Validate the options
    ///
    /// # Errors
    ///
    /// Returns error if any mandatory value is missing, the redirect URI is
    /// not an absolute URL, or the silent authorization timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(PassportError::Config("domain cannot be empty".to_string()).into());
        }

        if self.client_id.trim().is_empty() {
            return Err(PassportError::Config("client_id cannot be empty".to_string()).into());
        }

        if self.redirect_uri.trim().is_empty() {
            return Err(PassportError::Config("redirect_uri cannot be empty".to_string()).into());
        }

        if let Err(e) = url::Url::parse(&self.redirect_uri) {
            return Err(PassportError::Config(format!(
                "redirect_uri is not a valid absolute URL: {}",
                e
            ))
            .into());
        }

        if self.authorize_timeout_in_seconds == 0 {
            return Err(PassportError::Config(
                "authorize_timeout_in_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.leeway < 0 {
            return Err(PassportError::Config("leeway cannot be negative".to_string()).into());
        }

        Ok(())
    }

    /// Silent authorization budget as a [`Duration`]
    pub fn authorize_timeout(&self) -> Duration {
        Duration::from_secs(self.authorize_timeout_in_seconds)
    }
}
