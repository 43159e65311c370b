use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, Validation};
use log::debug;
use serde_json::Value;

use super::BEARER_TOKEN_TTL;
use crate::actor::Actor;
use crate::error::{AuthError, Result};
use crate::keys::parse_jwks_public_key;
use crate::models::{BearerJwt, GrantType};
use crate::secure::constant_time_eq;
use crate::service::AuthService;
use crate::token::{OAuthToken, mint};

/// Read a JWT's claims without checking its signature.
///
/// Only for locating the key to verify it with; nothing read here is trusted.
pub fn decode_unverified_claims(token: &str) -> Result<Value> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(AuthError::InvalidArgument(
                "bearer JWT is not a compact JWS".to_string(),
            ));
        }
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::InvalidArgument("bearer JWT payload is not base64url".into()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidArgument(format!("bearer JWT payload: {}", e)))
}

fn string_claim<'a>(claims: &'a Value, name: &str) -> &'a str {
    claims.get(name).and_then(Value::as_str).unwrap_or_default()
}

impl AuthService {
    /// Client authentication with a JWT signed by a key the client published
    /// at registration. Yields a client-only token.
    pub(crate) async fn authenticate_bearer_jwt(&self, jwt: &BearerJwt) -> Result<OAuthToken> {
        let header = jsonwebtoken::decode_header(&jwt.token)
            .map_err(|e| AuthError::InvalidArgument(format!("malformed bearer JWT: {}", e)))?;
        if matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::InvalidArgument(
                "bearer JWT must be signed with an asymmetric key".to_string(),
            ));
        }

        // The issuer is the client id; it selects the key.
        let unverified = decode_unverified_claims(&jwt.token)?;
        let client_id = string_claim(&unverified, "iss");
        if client_id.is_empty() {
            return Err(AuthError::InvalidArgument(
                "bearer JWT has empty issuer, can't look up key".to_string(),
            ));
        }

        let client = self.stores.clients.get(client_id).await?;
        let jwks = client
            .jwks
            .as_deref()
            .filter(|jwks| !jwks.trim().is_empty())
            .ok_or_else(|| {
                AuthError::InvalidArgument(format!(
                    "client {:?} (identified by bearer JWT) has no JWKS",
                    client.id
                ))
            })?;
        let decoding = parse_jwks_public_key(jwks, header.kid.as_deref()).map_err(|e| {
            AuthError::InvalidArgument(format!(
                "parsing client {:?} JWKS public key: {}",
                client.id, e
            ))
        })?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[client.id.as_str()]);
        // exp is enforced when present but not required.
        validation.required_spec_claims.clear();
        // aud is compared below in constant time.
        validation.validate_aud = false;

        let claims = jsonwebtoken::decode::<Value>(&jwt.token, &decoding, &validation)
            .map_err(|e| {
                AuthError::Unauthenticated(format!("bearer JWT verification failed: {}", e))
            })?
            .claims;

        let aud = string_claim(&claims, "aud");
        let token_url = self.token_url.as_str();
        if !constant_time_eq(aud.as_bytes(), token_url.as_bytes()) {
            return Err(AuthError::PermissionDenied(format!(
                "bearer JWT aud claim mismatch (JWT {:?}, server {:?})",
                aud, token_url
            )));
        }

        debug!("Verified bearer JWT from client {:?}", client.id);
        mint(
            &self.key,
            &Actor::client_only(client.id),
            GrantType::BearerJwt.metadata(),
            BEARER_TOKEN_TTL,
        )
    }
}
