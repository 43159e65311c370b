use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key that opts a client into open enrollment
pub const META_ALLOW_LOGINS: &str = "allow-logins";
/// Metadata key for the access granted to open-enrollment users
pub const META_DEFAULT_ACCESS: &str = "default-access";
/// Grant metadata key stamped into every minted token
pub const META_GRANT_TYPE: &str = "GrantType";

/// A user record held by the local user store or the federated root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: i32,
    pub login: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub emails: Vec<String>,
}

/// The public shape of a user returned by account creation and linking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub uid: i32,
    pub login: String,
    #[serde(default)]
    pub domain: String,
}

impl From<&User> for UserSpec {
    fn from(user: &User) -> Self {
        Self {
            uid: user.uid,
            login: user.login.clone(),
            domain: user.domain.clone(),
        }
    }
}

/// Request to create an account, locally or on the root server.
///
/// `uid` is set when the account must reuse an identifier allocated
/// elsewhere (a federated link).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub login: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i32>,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("login", &self.login)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("uid", &self.uid)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub id: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Published public key material, as a JWKS JSON document
    #[serde(default)]
    pub jwks: Option<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl RegisteredClient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    pub fn with_jwks(mut self, jwks: impl Into<String>) -> Self {
        self.jwks = Some(jwks.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    fn meta_value(&self, key: &str) -> &str {
        self.meta.get(key).map(String::as_str).unwrap_or_default()
    }

    /// `allow-logins=all`: any user may self-enroll on this client
    pub fn allows_all_logins(&self) -> bool {
        self.meta_value(META_ALLOW_LOGINS) == "all"
    }

    /// `default-access=write`: self-enrolled users also get write access
    pub fn default_write_access(&self) -> bool {
        self.meta_value(META_DEFAULT_ACCESS) == "write"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeRequest {
    pub response_type: String,
    pub client_id: String,
    pub uid: i32,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Vec<String>,
}

/// An issued code, or a code presented for exchange along with the
/// redirect URI it was requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    #[serde(default)]
    pub redirect_uri: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerJwt {
    pub token: String,
}

/// The credential presented to the token endpoint; exactly one grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "grant", rename_all = "snake_case")]
pub enum Credentials {
    AuthorizationCode(AuthorizationCode),
    ResourceOwnerPassword(LoginCredentials),
    BearerJwt(BearerJwt),
}

impl Credentials {
    pub fn grant_type(&self) -> GrantType {
        match self {
            Credentials::AuthorizationCode(_) => GrantType::AuthorizationCode,
            Credentials::ResourceOwnerPassword(_) => GrantType::ResourceOwnerPassword,
            Credentials::BearerJwt(_) => GrantType::BearerJwt,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_sec: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissions {
    pub uid: i32,
    pub client_id: String,
    pub read: bool,
    pub write: bool,
    pub admin: bool,
}

impl UserPermissions {
    /// All-false permissions for the given pair
    pub fn none(uid: i32, client_id: impl Into<String>) -> Self {
        Self {
            uid,
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn any(&self) -> bool {
        self.read || self.write || self.admin
    }
}

/// Identity verified by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapUser {
    pub username: String,
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
    AuthorizationCode,
    ResourceOwnerPassword,
    #[serde(rename = "BearerJWT")]
    BearerJwt,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "AuthorizationCode",
            GrantType::ResourceOwnerPassword => "ResourceOwnerPassword",
            GrantType::BearerJwt => "BearerJWT",
        }
    }

    /// Token metadata map carrying `GrantType=<name>`
    pub fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([(META_GRANT_TYPE.to_string(), self.as_str().to_string())])
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
