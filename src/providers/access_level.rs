use std::sync::Arc;

use async_trait::async_trait;

use super::{ObjectContextProvider, consumer_type_scopes, resolve_tenant};
use crate::error::MappingError;
use crate::model::{AuthDetails, AuthFlow, ConsumerType, ObjectContext, ProviderKind, TenantContext};
use crate::repository::TenantRepository;
use crate::request::RequestData;
use crate::request::keys::{EXTERNAL_ISSUER, GLOBAL_ACCESS_LEVEL};
use crate::scopes::ScopesGetter;

/// Handles certificate-service callers that declare which tenant types
/// they may act on (`tenant_access_levels`).
pub struct AccessLevelProvider {
    tenants: Arc<dyn TenantRepository>,
    scopes: Arc<dyn ScopesGetter>,
}

impl AccessLevelProvider {
    pub fn new(tenants: Arc<dyn TenantRepository>, scopes: Arc<dyn ScopesGetter>) -> Self {
        Self { tenants, scopes }
    }
}

#[async_trait]
impl ObjectContextProvider for AccessLevelProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AccessLevel
    }

    async fn match_request(&self, data: &RequestData) -> Result<Option<AuthDetails>, MappingError> {
        if !data.is_cert_service_request() || data.get_access_levels().is_empty() {
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
        let consumer_type = data.get_consumer_type(ConsumerType::IntegrationSystem)?;
        let scopes = consumer_type_scopes(self.scopes.as_ref(), consumer_type)?;
        let access_levels = data.get_access_levels();

        let (tenant, region) = match data.get_external_tenant_id() {
            Err(e) if e.is_key_does_not_exist() => {
                if !access_levels.iter().any(|l| l == GLOBAL_ACCESS_LEVEL) {
                    return Err(MappingError::unauthorized(format!(
                        "Certificate with auth ID {} does not have global access",
                        details.auth_id
                    )));
                }
                (TenantContext::default(), None)
            }
            Err(e) => return Err(e),
            Ok(external_tenant_id) => {
                let (tenant, record) =
                    resolve_tenant(self.tenants.as_ref(), &external_tenant_id, &details.auth_id)
                        .await?;
                // An unknown tenant cannot be authorized against; it stays soft-empty.
                if let Some(record) = &record {
                    if !access_levels.iter().any(|l| *l == record.tenant_type) {
                        return Err(MappingError::unauthorized(format!(
                            "Certificate with auth ID {} has no access to {} tenant with ID {}",
                            details.auth_id, record.tenant_type, external_tenant_id
                        )));
                    }
                }
                (tenant, record.and_then(|t| t.region()))
            }
        };

        Ok(ObjectContext {
            tenant,
            scopes,
            consumer_id: details.auth_id.clone(),
            consumer_type,
            auth_flow: details.auth_flow,
            region,
            provider: self.kind(),
            oauth_client_id: None,
        })
    }
}
