//! JSON Web Key resolution and JWT verification.
//!
//! Keys are resolved through [`KeyResolver`], which has two strategies:
//!
//! - **Per-key cache** ([`PerKeyCache`]): caches each key id for a fixed TTL
//!   and fetches misses through a [`KeyFetcher`], normally
//!   [`DiscoveryKeyFetcher`] (OIDC discovery on the token issuer).
//!   Concurrent misses for the same key id trigger a single fetch.
//! - **Whole-set cache** ([`KeySetCache`]): periodically re-reads a complete
//!   JWKS document from an http(s) or `file://` URL and swaps it in
//!   atomically.
//!
//! [`TokenVerifier`] checks signatures and registered claims on top of
//! either strategy.

mod fetcher;
mod key_set;
mod per_key;
mod token;
mod verifier;

pub use fetcher::{DiscoveryKeyFetcher, discovery_url};
pub use key_set::{KeySetCache, KeySource};
pub use per_key::{DEFAULT_KEY_TTL_SECONDS, PerKeyCache};
pub use token::UnverifiedToken;
pub use verifier::{TokenVerifier, VerifierConfig};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey};
use thiserror::Error;

/// Timeout of every outbound key or discovery request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote document a fetch step was retrieving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    Discovery,
    KeySet,
}

impl fmt::Display for FetchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStep::Discovery => f.write_str("OIDC discovery document"),
            FetchStep::KeySet => f.write_str("remote JWK set"),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("no issuer claim found")]
    MissingIssuer,

    #[error("unable to find the key ID in the token")]
    MissingKeyId,

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unable to find a proper key [kid={kid}, alg={alg}]")]
    KeyNotFound { kid: String, alg: String },

    #[error("failed to fetch {step} from {url}: {reason}")]
    Fetch {
        step: FetchStep,
        url: String,
        reason: String,
    },

    #[error("failed to parse {step} from {url}: {reason}")]
    Parse {
        step: FetchStep,
        url: String,
        reason: String,
    },

    #[error("no valid keys found in JWK set")]
    NoValidKeys,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("while building HTTP client: {0}")]
    Client(String),
}

/// Resolves the verification key for a token.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn get_key(&self, token: &UnverifiedToken) -> Result<DecodingKey, JwksError>;
}

/// Resolves a key without any caching, used behind [`PerKeyCache`].
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_key(&self, token: &UnverifiedToken) -> Result<DecodingKey, JwksError>;
}

/// Reject algorithms that cannot be verified with a published public key.
pub fn ensure_supported(alg: Algorithm) -> Result<(), JwksError> {
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Err(JwksError::UnsupportedAlgorithm(format!("{:?}", alg)))
        }
        _ => Ok(()),
    }
}

/// Whether a JWK may verify signatures made with `alg`. A JWK without an
/// `alg` member is accepted for any algorithm of its key type.
pub(crate) fn jwk_allows(jwk: &Jwk, alg: Algorithm) -> bool {
    // Algorithm and KeyAlgorithm share variant names for signing algorithms.
    match &jwk.common.key_algorithm {
        Some(key_alg) => format!("{:?}", key_alg) == format!("{:?}", alg),
        None => true,
    }
}

/// Find the key matching both `kid` and `alg` in a key set.
pub(crate) fn find_key(set: &JwkSet, kid: &str, alg: Algorithm) -> Result<DecodingKey, JwksError> {
    let jwk = set
        .keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid) && jwk_allows(k, alg))
        .ok_or_else(|| JwksError::KeyNotFound {
            kid: kid.to_string(),
            alg: format!("{:?}", alg),
        })?;

    DecodingKey::from_jwk(jwk).map_err(|e| JwksError::InvalidToken(format!("unusable JWK {}: {}", kid, e)))
}

pub(crate) fn http_client() -> Result<reqwest::Client, JwksError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| JwksError::Client(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_algorithms_unsupported() {
        assert!(matches!(
            ensure_supported(Algorithm::HS256),
            Err(JwksError::UnsupportedAlgorithm(_))
        ));
        assert!(ensure_supported(Algorithm::RS256).is_ok());
        assert!(ensure_supported(Algorithm::ES256).is_ok());
    }

    #[test]
    fn test_find_key_matches_kid_and_alg() {
        let set: JwkSet = serde_json::from_value(test_keys::jwks("key-1")).unwrap();
        assert!(find_key(&set, "key-1", Algorithm::RS256).is_ok());

        let err = find_key(&set, "key-2", Algorithm::RS256).err().unwrap();
        assert_eq!(err.to_string(), "unable to find a proper key [kid=key-2, alg=RS256]");

        assert!(matches!(
            find_key(&set, "key-1", Algorithm::RS512),
            Err(JwksError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_error_messages_name_the_step() {
        let err = JwksError::Fetch {
            step: FetchStep::KeySet,
            url: "https://idp/keys".to_string(),
            reason: "status = 404".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch remote JWK set from https://idp/keys: status = 404"
        );
    }
}
