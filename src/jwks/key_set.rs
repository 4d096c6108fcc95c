use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::fetcher::get_json;
use super::{FetchStep, JwksError, KeyResolver, UnverifiedToken, http_client, jwk_allows};

/// Where a whole JWK set is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Http(String),
    File(PathBuf),
}

impl KeySource {
    pub fn parse(location: &str) -> Result<Self, JwksError> {
        let invalid = |reason: String| JwksError::Fetch {
            step: FetchStep::KeySet,
            url: location.to_string(),
            reason,
        };
        let url = Url::parse(location).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(KeySource::Http(location.to_string())),
            "file" => url
                .to_file_path()
                .map(KeySource::File)
                .map_err(|_| invalid("invalid file path".to_string())),
            other => Err(invalid(format!("unsupported scheme {}", other))),
        }
    }

    fn location(&self) -> String {
        match self {
            KeySource::Http(url) => url.clone(),
            KeySource::File(path) => path.display().to_string(),
        }
    }
}

struct RingKey {
    kid: Option<String>,
    jwk: Jwk,
    key: DecodingKey,
}

/// Complete JWK set refreshed as a unit and swapped in atomically.
pub struct KeySetCache {
    source: KeySource,
    client: reqwest::Client,
    ring: ArcSwap<Vec<RingKey>>,
}

impl KeySetCache {
    pub fn new(source: KeySource) -> Result<Self, JwksError> {
        Ok(Self {
            source,
            client: http_client()?,
            ring: ArcSwap::from_pointee(Vec::new()),
        })
    }

    /// Re-read the whole set. On error the previous set stays live.
    pub async fn refresh(&self) -> Result<usize, JwksError> {
        let set = self.load_set().await?;

        let mut ring = Vec::with_capacity(set.keys.len());
        for jwk in set.keys {
            match DecodingKey::from_jwk(&jwk) {
                Ok(key) => ring.push(RingKey {
                    kid: jwk.common.key_id.clone(),
                    jwk,
                    key,
                }),
                Err(e) => warn!("Skipping unusable JWK {:?}: {}", jwk.common.key_id, e),
            }
        }

        if ring.is_empty() {
            return Err(JwksError::NoValidKeys);
        }

        let count = ring.len();
        self.ring.store(Arc::new(ring));
        debug!("Loaded {} keys from {}", count, self.source.location());
        Ok(count)
    }

    async fn load_set(&self) -> Result<JwkSet, JwksError> {
        match &self.source {
            KeySource::Http(url) => get_json(&self.client, url, FetchStep::KeySet).await,
            KeySource::File(path) => {
                let location = path.display().to_string();
                let raw = tokio::fs::read(path).await.map_err(|e| JwksError::Fetch {
                    step: FetchStep::KeySet,
                    url: location.clone(),
                    reason: e.to_string(),
                })?;
                serde_json::from_slice(&raw).map_err(|e| JwksError::Parse {
                    step: FetchStep::KeySet,
                    url: location,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Refresh every `period` until the handle is aborted.
    pub fn spawn_refresher(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match self.refresh().await {
                    Ok(count) => info!("JWK set refreshed ({} keys)", count),
                    Err(e) => warn!("JWK set refresh failed, keeping previous keys: {}", e),
                }
            }
        })
    }

    pub fn key_count(&self) -> usize {
        self.ring.load().len()
    }

    fn lookup(&self, kid: Option<&str>, alg: Algorithm) -> Option<DecodingKey> {
        let ring = self.ring.load();
        ring.iter()
            .find(|k| match kid {
                Some(kid) => k.kid.as_deref() == Some(kid) && jwk_allows(&k.jwk, alg),
                // without a key id, the first key usable with the algorithm
                None => jwk_allows(&k.jwk, alg),
            })
            .map(|k| k.key.clone())
    }
}

#[async_trait]
impl KeyResolver for KeySetCache {
    async fn get_key(&self, token: &UnverifiedToken) -> Result<DecodingKey, JwksError> {
        let alg = token.algorithm()?;
        self.lookup(token.kid(), alg)
            .ok_or_else(|| JwksError::KeyNotFound {
                kid: token.kid().unwrap_or_default().to_string(),
                alg: format!("{:?}", alg),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::test_keys;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(kid: &str) -> UnverifiedToken {
        UnverifiedToken::parse(&test_keys::sign(kid, &json!({"sub": "u"}))).unwrap()
    }

    #[test]
    fn test_key_source_parse() {
        assert_eq!(
            KeySource::parse("https://idp/keys").unwrap(),
            KeySource::Http("https://idp/keys".to_string())
        );
        assert_eq!(
            KeySource::parse("file:///etc/jwks.json").unwrap(),
            KeySource::File(PathBuf::from("/etc/jwks.json"))
        );
        assert!(KeySource::parse("ftp://idp/keys").is_err());
        assert!(KeySource::parse("not a url").is_err());
    }

    #[tokio::test]
    async fn test_refresh_from_file_and_lookup() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), test_keys::jwks("key-1").to_string()).unwrap();
        let url = Url::from_file_path(file.path()).unwrap();

        let cache = KeySetCache::new(KeySource::parse(url.as_str()).unwrap()).unwrap();
        assert!(matches!(
            cache.get_key(&token("key-1")).await,
            Err(JwksError::KeyNotFound { .. })
        ));

        assert_eq!(cache.refresh().await.unwrap(), 1);
        assert!(cache.get_key(&token("key-1")).await.is_ok());
        assert!(matches!(
            cache.get_key(&token("key-2")).await,
            Err(JwksError::KeyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(test_keys::jwks("key-1")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
            .mount(&server)
            .await;

        let source = KeySource::parse(&format!("{}/keys", server.uri())).unwrap();
        let cache = KeySetCache::new(source).unwrap();

        assert_eq!(cache.refresh().await.unwrap(), 1);
        assert!(matches!(cache.refresh().await, Err(JwksError::NoValidKeys)));
        assert_eq!(cache.key_count(), 1);
        assert!(cache.get_key(&token("key-1")).await.is_ok());
    }
}
