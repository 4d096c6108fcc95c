//! External authenticator descriptors.
//!
//! An authenticator is a trusted identity provider whose tokens carry human
//! users. Each descriptor names the claims that identify it (unique
//! attribute), the user (identity attribute) and the tenant (tenant
//! attribute), plus the issuers it trusts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::MappingError;
use crate::request::RequestData;

fn default_protocol() -> String {
    "https".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorConfig {
    pub name: String,
    #[serde(default)]
    pub trusted_issuers: Vec<TrustedIssuer>,
    pub attributes: AuthenticatorAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedIssuer {
    /// Domain the issuer host must belong to, e.g. `accounts.example.com`.
    pub domain_url: String,
    /// Prefix stripped from every scope the issuer grants.
    #[serde(default)]
    pub scope_prefix: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttributes {
    pub unique_attribute: Attribute,
    pub tenant_attribute: Attribute,
    pub identity_attribute: Attribute,
    #[serde(default)]
    pub client_id_attribute: Option<Attribute>,
}

/// Claim key (dotted paths allowed) and, for the unique attribute, the
/// value it must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Which authenticator, and which of its trusted issuers, validated a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub name: String,
    #[serde(default)]
    pub index: usize,
}

impl TrustedIssuer {
    /// Whether a token `iss` value was minted by this issuer.
    pub fn matches_issuer(&self, iss: &str) -> bool {
        let Ok(url) = Url::parse(iss) else {
            return false;
        };
        if url.scheme() != self.protocol {
            return false;
        }
        match url.host_str() {
            Some(host) => {
                host == self.domain_url || host.ends_with(&format!(".{}", self.domain_url))
            }
            None => false,
        }
    }
}

impl AuthenticatorConfig {
    pub fn trusted_issuer(&self, index: usize) -> Option<&TrustedIssuer> {
        self.trusted_issuers.get(index)
    }

    /// Index of the trusted issuer that minted a token with this `iss`.
    pub fn issuer_index(&self, iss: &str) -> Option<usize> {
        self.trusted_issuers
            .iter()
            .position(|issuer| issuer.matches_issuer(iss))
    }

    pub fn matches_unique_attribute(&self, data: &RequestData) -> bool {
        let unique = &self.attributes.unique_attribute;
        data.get_string(&unique.key)
            .map(|v| v == unique.value)
            .unwrap_or(false)
    }
}

/// Configured authenticators, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Authenticators(Vec<Arc<AuthenticatorConfig>>);

impl Authenticators {
    pub fn new(configs: Vec<AuthenticatorConfig>) -> Self {
        Self(configs.into_iter().map(Arc::new).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<AuthenticatorConfig>> {
        self.0.iter().find(|a| a.name == name)
    }

    /// Authenticator that claims the request, with the trusted issuer index.
    ///
    /// Explicit coordinates select the authenticator by name; otherwise the
    /// first one whose unique attribute matches wins. The unique attribute
    /// must match in both cases.
    pub fn claiming(
        &self,
        data: &RequestData,
    ) -> Result<Option<(Arc<AuthenticatorConfig>, usize)>, MappingError> {
        if let Some(coords) = data.authenticator_coordinates()? {
            return Ok(self
                .by_name(&coords.name)
                .filter(|a| a.matches_unique_attribute(data))
                .map(|a| (a.clone(), coords.index)));
        }

        Ok(self
            .0
            .iter()
            .find(|a| a.matches_unique_attribute(data))
            .map(|a| (a.clone(), 0)))
    }
}
