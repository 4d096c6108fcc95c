use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ObjectContextProvider, resolve_tenant};
use crate::error::MappingError;
use crate::model::{AuthDetails, AuthFlow, ConsumerType, ObjectContext, ProviderKind};
use crate::repository::TenantRepository;
use crate::request::RequestData;
use crate::request::keys::EXTERNAL_ISSUER;

/// Scopes granted to every certificate-service caller.
pub const CERT_SERVICE_SCOPES: [&str; 3] = ["runtime:read", "runtime:write", "tenant:read"];

/// Handles certificates minted by the external certificate service, whose
/// subject already is the external tenant id.
pub struct CertServiceProvider {
    tenants: Arc<dyn TenantRepository>,
}

impl CertServiceProvider {
    pub fn new(tenants: Arc<dyn TenantRepository>) -> Self {
        Self { tenants }
    }
}

#[async_trait]
impl ObjectContextProvider for CertServiceProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CertService
    }

    async fn match_request(&self, data: &RequestData) -> Result<Option<AuthDetails>, MappingError> {
        if !data.is_cert_service_request() {
            return Ok(None);
        }
        Ok(data
            .cert_client_id()
            .map(|id| AuthDetails::new(id, AuthFlow::Certificate).with_cert_issuer(EXTERNAL_ISSUER)))
    }

    async fn object_context(
        &self,
        _data: &RequestData,
        details: &AuthDetails,
    ) -> Result<ObjectContext, MappingError> {
        let external_tenant_id = details.auth_id.as_str();
        let (tenant, record) =
            resolve_tenant(self.tenants.as_ref(), external_tenant_id, &details.auth_id).await?;

        debug!(
            "Resolved certificate-service consumer to tenant {:?}",
            tenant.tenant_id.as_str()
        );

        Ok(ObjectContext {
            tenant,
            scopes: CERT_SERVICE_SCOPES.join(" "),
            consumer_id: details.auth_id.clone(),
            consumer_type: ConsumerType::Runtime,
            auth_flow: details.auth_flow,
            region: record.and_then(|t| t.region()),
            provider: self.kind(),
            oauth_client_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TenantContext;
    use crate::request::keys::{CLIENT_CERT_ISSUER_HEADER, CLIENT_ID_CERT_HEADER};
    use crate::test_support::{FailingTenantRepository, request, tenants};
    use serde_json::json;

    fn provider() -> CertServiceProvider {
        CertServiceProvider::new(Arc::new(tenants()))
    }

    #[tokio::test]
    async fn test_match_requires_trusted_issuer() {
        let p = provider();
        let data = request(
            json!({}),
            &[(CLIENT_ID_CERT_HEADER, "X"), (CLIENT_CERT_ISSUER_HEADER, EXTERNAL_ISSUER)],
        );
        let details = p.match_request(&data).await.unwrap().unwrap();
        assert_eq!(details.auth_id, "X");
        assert_eq!(details.auth_flow, AuthFlow::Certificate);
        assert_eq!(details.cert_issuer.as_deref(), Some(EXTERNAL_ISSUER));

        let data = request(
            json!({}),
            &[(CLIENT_ID_CERT_HEADER, "X"), (CLIENT_CERT_ISSUER_HEADER, "other")],
        );
        assert!(p.match_request(&data).await.unwrap().is_none());

        let data = request(json!({}), &[(CLIENT_ID_CERT_HEADER, "X")]);
        assert!(p.match_request(&data).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolves_subject_as_tenant() {
        let p = provider();
        let data = request(
            json!({}),
            &[(CLIENT_ID_CERT_HEADER, "X"), (CLIENT_CERT_ISSUER_HEADER, EXTERNAL_ISSUER)],
        );
        let details = p.match_request(&data).await.unwrap().unwrap();
        let ctx = p.object_context(&data, &details).await.unwrap();

        assert_eq!(ctx.consumer_id, "X");
        assert_eq!(ctx.consumer_type, ConsumerType::Runtime);
        assert_eq!(ctx.scopes, "runtime:read runtime:write tenant:read");
        assert_eq!(ctx.tenant, TenantContext::new("X", "T"));
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_soft_empty() {
        let p = provider();
        let details = AuthDetails::new("not-imported", AuthFlow::Certificate);
        let ctx = p.object_context(&request(json!({}), &[]), &details).await.unwrap();
        assert_eq!(ctx.tenant, TenantContext::unresolved("not-imported"));
    }

    #[tokio::test]
    async fn test_repository_failure_propagates() {
        let p = CertServiceProvider::new(Arc::new(FailingTenantRepository));
        let details = AuthDetails::new("X", AuthFlow::Certificate);
        assert!(p.object_context(&request(json!({}), &[]), &details).await.is_err());
    }
}
