use std::sync::Arc;

use jsonwebtoken::{Validation, decode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{JwksError, KeyResolver, UnverifiedToken, ensure_supported};

/// Claim checks applied after the signature is verified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierConfig {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    /// Accept `alg: none` tokens without a signature. Never enable in
    /// production.
    #[serde(default)]
    pub allow_unsigned: bool,
    #[serde(default)]
    pub leeway_seconds: u64,
}

/// Verifies compact JWTs against keys from a [`KeyResolver`].
pub struct TokenVerifier {
    resolver: Arc<dyn KeyResolver>,
    config: VerifierConfig,
}

impl TokenVerifier {
    pub fn new(resolver: Arc<dyn KeyResolver>, config: VerifierConfig) -> Self {
        if config.allow_unsigned {
            warn!("Token verifier accepts unsigned tokens");
        }
        Self { resolver, config }
    }

    /// Verify `token` and return its claims.
    pub async fn verify(&self, token: &str) -> Result<Map<String, Value>, JwksError> {
        let parsed = UnverifiedToken::parse(token)?;

        if parsed.is_unsigned() {
            if !self.config.allow_unsigned {
                return Err(JwksError::UnsupportedAlgorithm(parsed.alg_name().to_string()));
            }
            debug!("Accepting unsigned token");
            return Ok(parsed.into_claims());
        }

        let alg = parsed.algorithm()?;
        ensure_supported(alg)?;
        let key = self.resolver.get_key(&parsed).await?;

        let mut validation = Validation::new(alg);
        validation.leeway = self.config.leeway_seconds;
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Map<String, Value>>(parsed.raw(), &key, &validation)
            .map_err(|e| JwksError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::{KeySetCache, KeySource, test_keys};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;

    async fn resolver() -> (Arc<KeySetCache>, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), test_keys::jwks("key-1").to_string()).unwrap();
        let url = url::Url::from_file_path(file.path()).unwrap();
        let cache = KeySetCache::new(KeySource::parse(url.as_str()).unwrap()).unwrap();
        cache.refresh().await.unwrap();
        (Arc::new(cache), file)
    }

    fn unsigned_token() -> String {
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(r#"{"sub":"dev"}"#)
        )
    }

    #[tokio::test]
    async fn test_verify_signed_token() {
        let (cache, _file) = resolver().await;
        let verifier = TokenVerifier::new(
            cache,
            VerifierConfig {
                issuer: Some("https://idp".to_string()),
                ..Default::default()
            },
        );

        let token = test_keys::sign(
            "key-1",
            &json!({"iss": "https://idp", "sub": "u", "aud": "x", "exp": test_keys::far_future()}),
        );
        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims["sub"], json!("u"));

        let wrong_issuer = test_keys::sign(
            "key-1",
            &json!({"iss": "https://other", "sub": "u", "exp": test_keys::far_future()}),
        );
        assert!(matches!(
            verifier.verify(&wrong_issuer).await,
            Err(JwksError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (cache, _file) = resolver().await;
        let verifier = TokenVerifier::new(cache, VerifierConfig::default());
        let token = test_keys::sign("key-1", &json!({"sub": "u", "exp": 1000}));
        assert!(matches!(
            verifier.verify(&token).await,
            Err(JwksError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_unsigned_tokens_only_in_permissive_mode() {
        let (cache, _file) = resolver().await;
        let strict = TokenVerifier::new(cache.clone(), VerifierConfig::default());
        assert!(matches!(
            strict.verify(&unsigned_token()).await,
            Err(JwksError::UnsupportedAlgorithm(_))
        ));

        let permissive = TokenVerifier::new(
            cache,
            VerifierConfig {
                allow_unsigned: true,
                ..Default::default()
            },
        );
        let claims = permissive.verify(&unsigned_token()).await.unwrap();
        assert_eq!(claims["sub"], json!("dev"));
    }
}
