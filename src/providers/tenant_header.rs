use std::sync::Arc;

use async_trait::async_trait;

use super::{ObjectContextProvider, consumer_type_scopes, resolve_tenant};
use crate::error::MappingError;
use crate::model::{AuthDetails, AuthFlow, ConsumerType, ObjectContext, ProviderKind};
use crate::repository::TenantRepository;
use crate::request::RequestData;
use crate::request::keys::{EXTERNAL_ISSUER, TENANT_HEADER};
use crate::scopes::ScopesGetter;

/// Handles certificate-service callers that name the tenant to act on in
/// the `Tenant` header.
pub struct TenantHeaderProvider {
    tenants: Arc<dyn TenantRepository>,
    scopes: Arc<dyn ScopesGetter>,
}

impl TenantHeaderProvider {
    pub fn new(tenants: Arc<dyn TenantRepository>, scopes: Arc<dyn ScopesGetter>) -> Self {
        Self { tenants, scopes }
    }
}

#[async_trait]
impl ObjectContextProvider for TenantHeaderProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::TenantHeader
    }

    async fn match_request(&self, data: &RequestData) -> Result<Option<AuthDetails>, MappingError> {
        if !data.is_cert_service_request() || data.header_value(TENANT_HEADER).is_none() {
            return Ok(None);
        }
        Ok(data
            .cert_client_id()
            .map(|id| AuthDetails::new(id, AuthFlow::Certificate).with_cert_issuer(EXTERNAL_ISSUER)))
    }

    async fn object_context(
        &self,
        data: &RequestData,
        details: &AuthDetails,
    ) -> Result<ObjectContext, MappingError> {
        let consumer_type = data.get_consumer_type(ConsumerType::Runtime)?;
        let scopes = consumer_type_scopes(self.scopes.as_ref(), consumer_type)?;

        let external_tenant_id = data
            .header_value(TENANT_HEADER)
            .ok_or_else(|| MappingError::KeyDoesNotExist(TENANT_HEADER.to_string()))?;
        let (tenant, record) =
            resolve_tenant(self.tenants.as_ref(), external_tenant_id, &details.auth_id).await?;

        Ok(ObjectContext {
            tenant,
            scopes,
            consumer_id: details.auth_id.clone(),
            consumer_type,
            auth_flow: details.auth_flow,
            region: record.and_then(|t| t.region()),
            provider: self.kind(),
            oauth_client_id: None,
        })
    }
}
