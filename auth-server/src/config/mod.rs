use std::fmt;

use auth_engine::{AuthFlags, AuthSource};
use confique::Config;
use thiserror::Error;
use url::Url;

pub mod federation;

pub(crate) use crate::config::federation::FederationConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] confique::Error),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            name,
            reason: reason.to_string(),
        }
    }
}

/// Main configuration structure for the authorization server
#[derive(Config, Clone)]
pub struct Settings {
    /// The port the server listens on (default: 8080)
    #[config(env = "AUTH_PORT", default = 8080)]
    pub port: u16,

    /// Public base URL of this server; the token endpoint is resolved
    /// against it
    #[config(env = "AUTH_APP_URL", default = "http://localhost:8080/")]
    pub app_url: String,

    /// This server's own client id, used as token issuer
    #[config(env = "AUTH_SERVER_ID", default = "localhost")]
    pub server_id: String,

    /// Domain stamped on local accounts
    #[config(env = "AUTH_DOMAIN", default = "localhost")]
    pub domain: String,

    /// Base64url encoded 32-byte Ed25519 seed. A random key is generated
    /// when unset, invalidating tokens on restart.
    #[config(env = "AUTH_SIGNING_KEY_SEED")]
    pub signing_key_seed: Option<String>,

    /// Where passwords are verified: "local" or "ldap" (default: local)
    #[config(env = "AUTH_SOURCE", default = "local")]
    pub source: String,

    /// Let every authenticated user log in to every client. Test
    /// deployments only.
    #[config(env = "AUTH_ALLOW_ALL_LOGINS", default = false)]
    pub allow_all_logins: bool,

    /// Redirect URIs registered for this server's own client,
    /// comma-separated
    #[config(env = "AUTH_REDIRECT_URIS", default = "")]
    pub redirect_uris: String,

    /// Bootstrap administrator account
    #[config(nested)]
    pub admin: AdminConfig,

    /// Federated root server
    #[config(nested)]
    pub federation: FederationConfig,
}

/// Administrator created at startup when both fields are set
#[derive(Config, Clone, Default)]
pub struct AdminConfig {
    #[config(env = "AUTH_ADMIN_LOGIN")]
    pub login: Option<String>,

    #[config(env = "AUTH_ADMIN_PASSWORD")]
    pub password: Option<String>,
}

impl AdminConfig {
    /// Login and password, if both are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.login), non_empty(&self.password)) {
            (Some(login), Some(password)) => Some((login, password)),
            _ => None,
        }
    }
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Settings {
    /// Loads settings from `AUTH_*` environment variables and validates them
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Settings::builder().env().load()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_id.trim().is_empty() {
            return Err(ConfigError::invalid("AUTH_SERVER_ID", "must not be empty"));
        }
        self.token_url()?;
        self.auth_flags()?;
        self.federation.root_url()?;
        Ok(())
    }

    pub fn app_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.app_url).map_err(|e| ConfigError::invalid("AUTH_APP_URL", e))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::invalid("AUTH_APP_URL", "not a base URL"));
        }
        Ok(url)
    }

    /// Absolute URL of the token endpoint, the audience bearer-JWT
    /// assertions must name
    pub fn token_url(&self) -> Result<Url, ConfigError> {
        let mut base = self.app_url()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("oauth2/token")
            .map_err(|e| ConfigError::invalid("AUTH_APP_URL", e))
    }

    pub fn auth_flags(&self) -> Result<AuthFlags, ConfigError> {
        let source: AuthSource = self
            .source
            .parse()
            .map_err(|e: auth_engine::AuthError| ConfigError::invalid("AUTH_SOURCE", e.message()))?;
        Ok(AuthFlags {
            source,
            allow_all_logins: self.allow_all_logins,
        })
    }

    pub fn get_redirect_uris(&self) -> Vec<String> {
        self.redirect_uris
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0,
            app_url: "https://auth.example.com/".to_string(),
            server_id: "auth.example.com".to_string(),
            domain: "example.com".to_string(),
            signing_key_seed: None,
            source: "local".to_string(),
            allow_all_logins: false,
            redirect_uris: "https://auth.example.com/login/callback".to_string(),
            admin: AdminConfig::default(),
            federation: FederationConfig::disabled(),
        }
    }

    #[cfg(test)]
    pub fn for_test_with_root(root_mock: &wiremock::MockServer) -> Self {
        Self {
            federation: FederationConfig {
                root_url: Some(root_mock.uri()),
                ..FederationConfig::disabled()
            },
            ..Self::for_test()
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("port", &self.port)
            .field("app_url", &self.app_url)
            .field("server_id", &self.server_id)
            .field("domain", &self.domain)
            .field("signing_key_seed", &self.signing_key_seed.is_some())
            .field("source", &self.source)
            .field("allow_all_logins", &self.allow_all_logins)
            .field("redirect_uris", &self.redirect_uris)
            .field("admin", &self.admin)
            .field("federation", &self.federation)
            .finish()
    }
}
