use confique::Config;
use url::Url;

use super::{non_empty, ConfigError};

/// Configuration for the federated root identity server
#[derive(Debug, Config, Clone)]
pub struct FederationConfig {
    /// Base URL of the root server. Federation is disabled when unset.
    #[config(env = "AUTH_FEDERATION_ROOT_URL")]
    pub root_url: Option<String>,

    /// Timeout for root server requests in seconds (default: 5)
    #[config(env = "AUTH_FEDERATION_TIMEOUT", default = 5)]
    pub timeout: u64,

    /// Timeout for establishing a connection in seconds (default: 2)
    #[config(env = "AUTH_FEDERATION_CONNECT_TIMEOUT", default = 2)]
    pub connect_timeout: u64,
}

impl FederationConfig {
    pub fn disabled() -> Self {
        Self {
            root_url: None,
            timeout: 5,
            connect_timeout: 2,
        }
    }

    /// The parsed root URL, `None` when federation is disabled
    pub fn root_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = non_empty(&self.root_url) else {
            return Ok(None);
        };
        let url = Url::parse(raw)
            .map_err(|e| ConfigError::invalid("AUTH_FEDERATION_ROOT_URL", e))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::invalid(
                "AUTH_FEDERATION_ROOT_URL",
                "not a base URL",
            ));
        }
        if self.timeout == 0 {
            return Err(ConfigError::invalid(
                "AUTH_FEDERATION_TIMEOUT",
                "must be at least one second",
            ));
        }
        Ok(Some(url))
    }
}
