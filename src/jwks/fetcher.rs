use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{FetchStep, JwksError, KeyFetcher, UnverifiedToken, ensure_supported, find_key, http_client};

const TOKEN_ENDPOINT_SUFFIX: &str = "/oauth/token";
const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

#[derive(Debug, Deserialize)]
struct OpenIdConfiguration {
    jwks_uri: String,
}

/// OIDC discovery URL for a token issuer. Issuers that point at their token
/// endpoint have the `/oauth/token` suffix removed first.
pub fn discovery_url(issuer: &str) -> String {
    let base = issuer.trim_end_matches('/');
    let base = base.strip_suffix(TOKEN_ENDPOINT_SUFFIX).unwrap_or(base);
    format!("{}{}", base.trim_end_matches('/'), DISCOVERY_PATH)
}

/// Fetches the signing key of a token from its issuer via OIDC discovery.
pub struct DiscoveryKeyFetcher {
    client: reqwest::Client,
}

impl DiscoveryKeyFetcher {
    pub fn new() -> Result<Self, JwksError> {
        Ok(Self {
            client: http_client()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyFetcher for DiscoveryKeyFetcher {
    async fn fetch_key(&self, token: &UnverifiedToken) -> Result<DecodingKey, JwksError> {
        let issuer = token.issuer()?;
        let kid = token.require_kid()?;
        let alg = token.algorithm()?;
        ensure_supported(alg)?;

        let discovery = discovery_url(issuer);
        debug!("Fetching OIDC discovery document from {}", discovery);
        let config: OpenIdConfiguration =
            get_json(&self.client, &discovery, FetchStep::Discovery).await?;

        debug!("Fetching JWK set from {}", config.jwks_uri);
        let set: JwkSet = get_json(&self.client, &config.jwks_uri, FetchStep::KeySet).await?;

        find_key(&set, kid, alg)
    }
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    step: FetchStep,
) -> Result<T, JwksError> {
    let response = client.get(url).send().await.map_err(|e| JwksError::Fetch {
        step,
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(JwksError::Fetch {
            step,
            url: url.to_string(),
            reason: format!("status = {}", status.as_u16()),
        });
    }

    response.json().await.map_err(|e| JwksError::Parse {
        step,
        url: url.to_string(),
        reason: e.to_string(),
    })
}
