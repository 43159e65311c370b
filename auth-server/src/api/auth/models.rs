use std::fmt;

use auth_engine::models::{
    AccessTokenRequest, AccessTokenResponse, AuthorizationCode, AuthorizationCodeRequest,
    BearerJwt, Credentials, LoginCredentials, UserPermissions,
};
use auth_engine::AuthInfo;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request for an authorization code on behalf of the calling user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationCodeBody {
    /// Must be "code"
    pub response_type: String,
    /// Client the code is issued for
    pub client_id: String,
    /// The user the code is for; must be the caller
    #[serde(default)]
    pub uid: i32,
    /// Registered redirect URI of the client, optional
    #[serde(default)]
    pub redirect_uri: String,
    /// Scopes carried into the exchanged token
    #[serde(default)]
    pub scope: Vec<String>,
}

impl From<AuthorizationCodeBody> for AuthorizationCodeRequest {
    fn from(body: AuthorizationCodeBody) -> Self {
        Self {
            response_type: body.response_type,
            client_id: body.client_id,
            uid: body.uid,
            redirect_uri: body.redirect_uri,
            scope: body.scope,
        }
    }
}

/// An issued authorization code, or one presented for exchange
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationCodeResponse {
    pub code: String,
    #[serde(default)]
    pub redirect_uri: String,
}

impl From<AuthorizationCode> for AuthorizationCodeResponse {
    fn from(code: AuthorizationCode) -> Self {
        Self {
            code: code.code,
            redirect_uri: code.redirect_uri,
        }
    }
}

impl From<AuthorizationCodeResponse> for AuthorizationCode {
    fn from(code: AuthorizationCodeResponse) -> Self {
        Self {
            code: code.code,
            redirect_uri: code.redirect_uri,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordCredential {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for PasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCredential")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token request carrying one credential.
///
/// When several are set, the authorization code wins over the password,
/// which wins over the bearer JWT.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TokenRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_owner_password: Option<PasswordCredential>,
    /// Compact JWS signed with a key the client published at registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_jwt: Option<String>,
}

impl From<TokenRequestBody> for AccessTokenRequest {
    fn from(body: TokenRequestBody) -> Self {
        let credentials = if let Some(code) = body.authorization_code {
            Some(Credentials::AuthorizationCode(code.into()))
        } else if let Some(login) = body.resource_owner_password {
            Some(Credentials::ResourceOwnerPassword(LoginCredentials {
                login: login.login,
                password: login.password,
            }))
        } else {
            body.bearer_jwt
                .filter(|token| !token.is_empty())
                .map(|token| Credentials::BearerJwt(BearerJwt { token }))
        };
        Self { credentials }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Seconds until expiry; absent for tokens that never expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_sec: Option<i32>,
}

impl From<AccessTokenResponse> for TokenResponse {
    fn from(resp: AccessTokenResponse) -> Self {
        Self {
            access_token: resp.access_token,
            token_type: resp.token_type,
            expires_in_sec: resp.expires_in_sec,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentityResponse {
    pub client_id: String,
    pub uid: i32,
    pub login: String,
    pub domain: String,
}

impl From<AuthInfo> for IdentityResponse {
    fn from(info: AuthInfo) -> Self {
        Self {
            client_id: info.client_id,
            uid: info.uid,
            login: info.login,
            domain: info.domain,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionsResponse {
    pub uid: i32,
    pub client_id: String,
    pub read: bool,
    pub write: bool,
    pub admin: bool,
}

impl From<UserPermissions> for PermissionsResponse {
    fn from(perms: UserPermissions) -> Self {
        Self {
            uid: perms.uid,
            client_id: perms.client_id,
            read: perms.read,
            write: perms.write,
            admin: perms.admin,
        }
    }
}

/// Error body of every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error kind, e.g. "permission_denied"
    pub error: String,
    pub detail: String,
}
