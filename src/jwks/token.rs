use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::JwksError;

#[derive(Debug, Clone, Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Compact JWT split into its parts, before any signature check.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    raw: String,
    alg: String,
    kid: Option<String>,
    claims: Map<String, Value>,
}

impl UnverifiedToken {
    pub fn parse(token: &str) -> Result<Self, JwksError> {
        if token.is_empty() {
            return Err(JwksError::MalformedToken("token cannot be empty".to_string()));
        }

        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(JwksError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let header: RawHeader = decode_segment(header, "header")?;
        let claims: Map<String, Value> = decode_segment(payload, "payload")?;

        Ok(Self {
            raw: token.to_string(),
            alg: header.alg,
            kid: header.kid,
            claims,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Algorithm name exactly as written in the header.
    pub fn alg_name(&self) -> &str {
        &self.alg
    }

    pub fn is_unsigned(&self) -> bool {
        self.alg.eq_ignore_ascii_case("none")
    }

    pub fn algorithm(&self) -> Result<Algorithm, JwksError> {
        Algorithm::from_str(&self.alg).map_err(|_| JwksError::UnsupportedAlgorithm(self.alg.clone()))
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn require_kid(&self) -> Result<&str, JwksError> {
        self.kid().filter(|k| !k.is_empty()).ok_or(JwksError::MissingKeyId)
    }

    pub fn issuer(&self) -> Result<&str, JwksError> {
        self.claims
            .get("iss")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(JwksError::MissingIssuer)
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn into_claims(self) -> Map<String, Value> {
        self.claims
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, JwksError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| JwksError::MalformedToken(format!("invalid {} encoding: {}", what, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| JwksError::MalformedToken(format!("invalid {} JSON: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::test_keys;
    use serde_json::json;

    fn unsigned(header: Value, claims: Value) -> String {
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    #[test]
    fn test_parse_signed_token() {
        let token = test_keys::sign("key-1", &json!({"iss": "https://idp", "sub": "u"}));
        let parsed = UnverifiedToken::parse(&token).unwrap();
        assert_eq!(parsed.algorithm().unwrap(), Algorithm::RS256);
        assert_eq!(parsed.require_kid().unwrap(), "key-1");
        assert_eq!(parsed.issuer().unwrap(), "https://idp");
        assert_eq!(parsed.claims()["sub"], json!("u"));
    }

    #[test]
    fn test_parse_unsigned_token() {
        let token = unsigned(json!({"alg": "none"}), json!({"sub": "u"}));
        let parsed = UnverifiedToken::parse(&token).unwrap();
        assert!(parsed.is_unsigned());
        assert!(matches!(parsed.algorithm(), Err(JwksError::UnsupportedAlgorithm(_))));
        assert!(matches!(parsed.require_kid(), Err(JwksError::MissingKeyId)));
        assert!(matches!(parsed.issuer(), Err(JwksError::MissingIssuer)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(UnverifiedToken::parse(""), Err(JwksError::MalformedToken(_))));
        assert!(matches!(UnverifiedToken::parse("a.b"), Err(JwksError::MalformedToken(_))));
        assert!(matches!(
            UnverifiedToken::parse("!!.??.sig"),
            Err(JwksError::MalformedToken(_))
        ));
    }
}
