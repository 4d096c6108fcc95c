//! Tenant mapping for runtimes authenticating with their own tokens.
//!
//! A runtime is identified by the issuer of its token. The issuer is looked
//! up before the signature is checked so that keys are only ever fetched
//! from issuers of registered runtimes.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::MappingError;
use crate::jwks::{JwksError, TokenVerifier, UnverifiedToken};
use crate::repository::{RuntimeRepository, TenantRepository};
use crate::types::ExternalTenantId;

#[derive(Debug, Error)]
pub enum RuntimeMappingError {
    #[error("unexpected or empty authorization header")]
    MissingBearer,

    #[error("unable to get the issuer: {0}")]
    Issuer(#[source] JwksError),

    #[error("when getting the runtime: {0}")]
    Runtime(#[source] MappingError),

    #[error("while verifying the token: {0}")]
    Token(#[source] JwksError),

    #[error("unable to fetch external tenant based on runtime tenant: {0}")]
    Tenant(#[source] MappingError),
}

/// Verified runtime token together with the external id of its owner.
#[derive(Debug)]
pub struct RuntimeMapping {
    pub runtime_id: String,
    pub claims: Map<String, Value>,
    pub external_tenant: ExternalTenantId,
}

pub struct RuntimeMapper {
    verifier: Arc<TokenVerifier>,
    runtimes: Arc<dyn RuntimeRepository>,
    tenants: Arc<dyn TenantRepository>,
}

impl RuntimeMapper {
    pub fn new(
        verifier: Arc<TokenVerifier>,
        runtimes: Arc<dyn RuntimeRepository>,
        tenants: Arc<dyn TenantRepository>,
    ) -> Self {
        Self {
            verifier,
            runtimes,
            tenants,
        }
    }

    pub async fn map(&self, token: &str) -> Result<RuntimeMapping, RuntimeMappingError> {
        let unverified = UnverifiedToken::parse(token).map_err(RuntimeMappingError::Token)?;
        let issuer = unverified.issuer().map_err(RuntimeMappingError::Issuer)?;

        let runtime = self
            .runtimes
            .get_by_token_issuer(issuer)
            .await
            .map_err(RuntimeMappingError::Runtime)?;
        debug!("Token issuer {} belongs to runtime {}", issuer, runtime.id);

        let claims = self
            .verifier
            .verify(token)
            .await
            .map_err(RuntimeMappingError::Token)?;

        let tenant = self
            .tenants
            .get_by_internal_tenant(runtime.tenant_id.as_str())
            .await
            .map_err(RuntimeMappingError::Tenant)?;

        Ok(RuntimeMapping {
            runtime_id: runtime.id,
            claims,
            external_tenant: tenant.external_tenant,
        })
    }
}
