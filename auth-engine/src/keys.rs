//! The server's signing identity and client key material.
//!
//! The server signs access tokens with a single Ed25519 key. The private
//! half is a raw 32-byte seed; the public half is published as a JWKS so
//! registered clients and the root server can verify tokens minted here.
//! Clients publish their own JWKS on registration; [`parse_jwks_public_key`]
//! turns it into a verification key for bearer-JWT assertions.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("invalid signing key seed: {0}")]
    InvalidSeed(String),

    #[error("failed to encode signing key: {0}")]
    Encoding(String),

    #[error("invalid JWKS: {0}")]
    InvalidJwks(String),

    #[error("JWKS contains no usable key")]
    NoUsableKey,

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Claims of a bearer-JWT assertion a client presents to a token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// The process-wide signing identity.
///
/// `id` doubles as the server's own client id: actors whose client id
/// equals it are local logins.
pub struct IdKey {
    pub id: String,
    kid: String,
    public_key: [u8; 32],
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl IdKey {
    /// A key with a fresh random seed
    pub fn generate(id: impl Into<String>) -> Result<Self, KeyError> {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(id, seed)
    }

    pub fn from_seed(id: impl Into<String>, seed: [u8; 32]) -> Result<Self, KeyError> {
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = signing_key.verifying_key().to_bytes();
        let der = signing_key
            .to_pkcs8_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let encoding = EncodingKey::from_ed_der(der.as_bytes());
        let x = URL_SAFE_NO_PAD.encode(public_key);
        let decoding = DecodingKey::from_ed_components(&x)?;

        // Stable for a given key so seeded restarts keep the same kid.
        let kid = URL_SAFE_NO_PAD.encode(&Sha256::digest(public_key)[..12]);

        Ok(Self {
            id: id.into(),
            kid,
            public_key,
            encoding,
            decoding,
        })
    }

    /// Load from a base64url (or standard base64) encoded 32-byte seed
    pub fn from_base64_seed(id: impl Into<String>, encoded: &str) -> Result<Self, KeyError> {
        let encoded = encoded.trim();
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(encoded))
            .map_err(|e| KeyError::InvalidSeed(e.to_string()))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            KeyError::InvalidSeed(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Self::from_seed(id, seed)
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn jwks(&self) -> serde_json::Value {
        json!({
            "keys": [{
                "kty": "OKP",
                "crv": "Ed25519",
                "alg": "EdDSA",
                "use": "sig",
                "kid": self.kid,
                "x": URL_SAFE_NO_PAD.encode(self.public_key),
            }]
        })
    }

    /// The public half as a JWKS JSON document
    pub fn public_jwks(&self) -> String {
        self.jwks().to_string()
    }

    /// Sign an assertion identifying this server as a client of `aud`.
    pub fn bearer_assertion(&self, aud: &str, ttl: Duration) -> Result<String, KeyError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.id.clone(),
            aud: aud.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        Ok(jsonwebtoken::encode(&header, &claims, &self.encoding)?)
    }
}

impl fmt::Debug for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdKey")
            .field("id", &self.id)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Parse a client's published JWKS into a verification key.
///
/// The key whose `kid` matches is preferred; otherwise the first key
/// jsonwebtoken can use (OKP, RSA or EC).
pub fn parse_jwks_public_key(jwks: &str, kid: Option<&str>) -> Result<DecodingKey, KeyError> {
    let set: JwkSet =
        serde_json::from_str(jwks).map_err(|e| KeyError::InvalidJwks(e.to_string()))?;

    if let Some(kid) = kid {
        if let Some(jwk) = set.find(kid) {
            return Ok(DecodingKey::from_jwk(jwk)?);
        }
    }
    set.keys
        .iter()
        .find_map(|jwk| DecodingKey::from_jwk(jwk).ok())
        .ok_or(KeyError::NoUsableKey)
}
