//! Access token minting and verification.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::error::{AuthError, Result};
use crate::keys::IdKey;
use crate::models::AccessTokenResponse;

pub const TOKEN_TYPE: &str = "Bearer";

/// Claims carried by access tokens minted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub login: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub grant: HashMap<String, String>,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// A minted token before it is rendered into a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    /// `None` means the token never expires
    pub expiry: Option<DateTime<Utc>>,
}

/// Mint a signed token for `actor`.
///
/// A zero `ttl` yields a token without expiry.
pub fn mint(
    key: &IdKey,
    actor: &Actor,
    metadata: HashMap<String, String>,
    ttl: Duration,
) -> Result<OAuthToken> {
    let now = Utc::now();
    let expiry = if ttl.is_zero() {
        None
    } else {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AuthError::Internal(format!("token lifetime out of range: {}", e)))?;
        Some(now + ttl)
    };

    let claims = AccessClaims {
        iss: key.id.clone(),
        sub: actor.is_user().then(|| actor.uid.to_string()),
        client_id: actor.client_id.clone(),
        login: actor.login.clone(),
        domain: actor.domain.clone(),
        scope: actor.scope.clone(),
        grant: metadata,
        iat: now.timestamp(),
        exp: expiry.map(|e| e.timestamp()),
    };

    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(key.kid().to_string());
    let access_token = jsonwebtoken::encode(&header, &claims, key.encoding_key())
        .map_err(|e| AuthError::Internal(format!("failed to sign access token: {}", e)))?;

    debug!(
        "Minted token for uid {} client {:?} (expires {:?})",
        actor.uid, actor.client_id, expiry
    );
    Ok(OAuthToken {
        access_token,
        token_type: TOKEN_TYPE.to_string(),
        expiry,
    })
}

/// Decode and verify a token minted by `key`.
pub fn decode(key: &IdKey, token: &str) -> Result<AccessClaims> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_issuer(&[key.id.as_str()]);
    validation.validate_aud = false;
    // Tokens minted with a zero lifetime carry no exp.
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<AccessClaims>(token, key.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::Unauthenticated(format!("invalid access token: {}", e)))
}

/// Verify a token minted by `key` and recover its actor.
pub fn verify(key: &IdKey, token: &str) -> Result<Actor> {
    let claims = decode(key, token)?;
    let uid = match claims.sub.as_deref() {
        None => 0,
        Some(sub) => sub
            .parse()
            .map_err(|_| AuthError::Unauthenticated("invalid subject in access token".into()))?,
    };
    Ok(Actor {
        uid,
        client_id: claims.client_id,
        login: claims.login,
        domain: claims.domain,
        scope: claims.scope,
    })
}

/// Render a minted token as seen at `now`.
///
/// Panics if the token has an empty access token or type; that means the
/// minter is broken, not that the caller did anything wrong.
pub fn token_response(token: &OAuthToken, now: DateTime<Utc>) -> AccessTokenResponse {
    assert!(
        !token.access_token.is_empty(),
        "minted token has an empty access token"
    );
    assert!(
        !token.token_type.is_empty(),
        "minted token has an empty token type"
    );

    let expires_in_sec = token
        .expiry
        .filter(|expiry| *expiry != DateTime::UNIX_EPOCH)
        .map(|expiry| {
            let secs = (expiry - now).num_seconds();
            secs.clamp(0, i32::MAX as i64) as i32
        });

    AccessTokenResponse {
        access_token: token.access_token.clone(),
        token_type: token.token_type.clone(),
        expires_in_sec,
    }
}
