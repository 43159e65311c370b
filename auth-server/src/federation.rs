//! HTTP client for the federated root identity server.
//!
//! The root knows every federated account by email and allocates the uids
//! local accounts reuse when a directory user is linked. This server
//! authenticates to it as a client with a bearer-JWT assertion signed by its
//! own key, and caches the resulting access token until shortly before it
//! expires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use auth_engine::keys::KeyError;
use auth_engine::models::{AccessTokenResponse, NewAccount, User, UserSpec};
use auth_engine::store::FederatedClient;
use auth_engine::{AuthError, IdKey};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use log::{debug, error};
use reqwest::{Client, Response};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// Lifetime of the assertion presented to the root's token endpoint
const ASSERTION_TTL: Duration = Duration::from_secs(60);
/// Refresh the cached root token this long before it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("root server responded {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("signing assertion failed: {0}")]
    Assertion(#[from] KeyError),
    #[error("invalid root URL: {0}")]
    InvalidUrl(String),
}

impl From<FederationError> for AuthError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::Status { status, body } if status == StatusCode::NOT_FOUND => {
                AuthError::NotFound(format!("root server: {}", body))
            }
            FederationError::Status { status, body } if status == StatusCode::CONFLICT => {
                AuthError::AlreadyExists(format!("root server: {}", body))
            }
            other => AuthError::Internal(format!("federation: {}", other)),
        }
    }
}

struct RootToken {
    access_token: String,
    refresh_at: Option<Instant>,
}

impl RootToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.refresh_at.is_none_or(|at| now < at)
    }
}

pub struct HttpFederatedClient {
    client: Client,
    root: Url,
    key: Arc<IdKey>,
    token: Mutex<Option<RootToken>>,
}

impl HttpFederatedClient {
    pub fn new(
        root: Url,
        key: Arc<IdKey>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, FederationError> {
        if root.cannot_be_a_base() {
            return Err(FederationError::InvalidUrl(root.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Self {
            client,
            root,
            key,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FederationError> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|_| FederationError::InvalidUrl(self.root.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// A root access token, fetched with a fresh assertion when the cached
    /// one is missing or about to expire
    async fn access_token(&self) -> Result<String, FederationError> {
        let mut cached = self.token.lock().await;
        let now = Instant::now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.access_token.clone());
        }

        let token_url = self.endpoint(&["oauth2", "token"])?;
        let assertion = self.key.bearer_assertion(token_url.as_str(), ASSERTION_TTL)?;
        debug!("Requesting root server token from {}", token_url);

        let response = self
            .client
            .post(token_url)
            .json(&json!({ "bearer_jwt": assertion }))
            .send()
            .await?;
        let granted: AccessTokenResponse = check_status(response).await?.json().await?;

        let refresh_at = granted.expires_in_sec.map(|secs| {
            let lifetime = Duration::from_secs(secs.max(0) as u64);
            now + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN)
        });
        *cached = Some(RootToken {
            access_token: granted.access_token.clone(),
            refresh_at,
        });
        Ok(granted.access_token)
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<User, FederationError> {
        let url = self.endpoint(&["users", "by-email", email])?;
        let token = self.access_token().await?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn post_account(&self, account: &NewAccount) -> Result<UserSpec, FederationError> {
        let url = self.endpoint(&["accounts"])?;
        let token = self.access_token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(account)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, FederationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status != StatusCode::NOT_FOUND && status != StatusCode::CONFLICT {
        error!("Root server error {}: {}", status, body);
    }
    Err(FederationError::Status { status, body })
}

#[async_trait]
impl FederatedClient for HttpFederatedClient {
    async fn get_user_by_email(&self, email: &str) -> auth_engine::Result<User> {
        Ok(self.fetch_user_by_email(email).await?)
    }

    async fn create_account(&self, account: &NewAccount) -> auth_engine::Result<UserSpec> {
        let created = self.post_account(account).await?;
        debug!(
            "Root server created account {:?} with uid {}",
            created.login, created.uid
        );
        Ok(created)
    }
}
