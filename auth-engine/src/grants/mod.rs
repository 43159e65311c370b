//! Token endpoint grant resolvers.
//!
//! Each grant validates one kind of [`Credentials`] and mints a token for the
//! identity it proves.

mod bearer;
mod code;
mod password;

use std::time::Duration;

use chrono::Utc;
use log::info;

use crate::actor::Actor;
use crate::error::{AuthError, Result};
use crate::models::{AccessTokenRequest, AccessTokenResponse, Credentials};
use crate::service::AuthService;
use crate::token::token_response;

pub use bearer::decode_unverified_claims;

/// Lifetime of tokens issued for a user (code and password grants)
pub const USER_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Lifetime of client-only tokens issued for a bearer JWT
pub const BEARER_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

impl AuthService {
    pub async fn get_access_token(
        &self,
        actor: &Actor,
        req: &AccessTokenRequest,
    ) -> Result<AccessTokenResponse> {
        let credentials = req.credentials.as_ref().ok_or_else(|| {
            AuthError::Unauthenticated("no supported auth credentials provided".to_string())
        })?;

        let token = match credentials {
            Credentials::AuthorizationCode(code) => self.exchange_code(actor, code).await?,
            Credentials::ResourceOwnerPassword(login) => {
                self.authenticate_login(actor, login).await?
            }
            Credentials::BearerJwt(jwt) => self.authenticate_bearer_jwt(jwt).await?,
        };

        info!(
            "Issued {} access token via client {:?}",
            credentials.grant_type(),
            actor.client_id
        );
        Ok(token_response(&token, Utc::now()))
    }
}
