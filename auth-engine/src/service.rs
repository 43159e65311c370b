use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::actor::{Actor, AuthInfo};
use crate::error::{AuthError, Result};
use crate::keys::IdKey;
use crate::models::{AuthorizationCode, AuthorizationCodeRequest};
use crate::redirect::allow_redirect_uri;
use crate::store::Stores;

/// Lifetime of an issued authorization code
pub const AUTH_CODE_TTL: Duration = Duration::from_secs(5 * 60);

/// Where resource-owner passwords are verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthSource {
    /// The local password store
    #[default]
    Local,
    /// The LDAP directory, with account linking on first login
    Ldap,
}

impl FromStr for AuthSource {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(AuthSource::Local),
            "ldap" => Ok(AuthSource::Ldap),
            other => Err(AuthError::InvalidArgument(format!(
                "unknown auth source {:?} (expected \"local\" or \"ldap\")",
                other
            ))),
        }
    }
}

impl fmt::Display for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthSource::Local => f.write_str("local"),
            AuthSource::Ldap => f.write_str("ldap"),
        }
    }
}

/// Server-wide authentication switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthFlags {
    pub source: AuthSource,
    /// Grants read and write to every authenticated user on every client.
    /// Test deployments only.
    pub allow_all_logins: bool,
}

impl AuthFlags {
    pub fn is_ldap(&self) -> bool {
        self.source == AuthSource::Ldap
    }
}

/// The authorization server core.
#[derive(Debug, Clone)]
pub struct AuthService {
    pub stores: Stores,
    pub key: Arc<IdKey>,
    pub flags: AuthFlags,
    /// Absolute URL of this server's token endpoint, the required `aud` of
    /// bearer-JWT assertions
    pub token_url: Url,
}

impl AuthService {
    pub fn new(stores: Stores, key: Arc<IdKey>, flags: AuthFlags, token_url: Url) -> Self {
        if flags.allow_all_logins {
            warn!("allow-all-logins is enabled; every user may log in to every client");
        }
        Self {
            stores,
            key,
            flags,
            token_url,
        }
    }

    /// Issue a short-lived code the client exchanges for an access token.
    ///
    /// Only the user the code is for may request it, and only if that user
    /// has some permission on the client.
    pub async fn get_authorization_code(
        &self,
        actor: &Actor,
        req: &AuthorizationCodeRequest,
    ) -> Result<AuthorizationCode> {
        let authorizations = self.stores.authorizations()?;

        if req.response_type != "code" {
            return Err(AuthError::InvalidArgument(format!(
                "invalid response_type {:?}",
                req.response_type
            )));
        }

        let client = self.stores.clients.get(&req.client_id).await?;

        if !actor.is_user() || actor.uid != req.uid {
            return Err(AuthError::PermissionDenied(format!(
                "user {} attempted to create auth code for user {}",
                actor.uid, req.uid
            )));
        }

        let scoped = Actor::user(req.uid, &req.client_id);
        let perms = self.get_permissions(&scoped).await?;
        if !perms.any() {
            return Err(AuthError::PermissionDenied(format!(
                "user {} is not allowed to log in to client {:?}",
                req.uid, req.client_id
            )));
        }

        // Optional, but validated when present.
        if !req.redirect_uri.is_empty() {
            allow_redirect_uri(&client.redirect_uris, &req.redirect_uri)?;
        }

        let code = authorizations.create_auth_code(req, AUTH_CODE_TTL).await?;
        info!(
            "Issued authorization code for user {} on client {:?}",
            req.uid, req.client_id
        );
        Ok(AuthorizationCode {
            code,
            redirect_uri: req.redirect_uri.clone(),
        })
    }

    pub async fn identify(&self, actor: &Actor) -> AuthInfo {
        debug!("Identify uid {} client {:?}", actor.uid, actor.client_id);
        AuthInfo::from(actor)
    }
}
