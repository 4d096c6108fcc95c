//! Object context providers.
//!
//! Each provider is one strategy for turning a request into an
//! [`ObjectContext`]: a cheap `match_request` step that decides whether the
//! strategy applies and extracts [`AuthDetails`], and an `object_context`
//! step that performs lookups. The set of strategies is closed and held in
//! [`Provider`].

mod access_level;
mod authenticator;
mod cert_service;
mod static_user;
mod system_auth;
mod tenant_header;

pub use access_level::AccessLevelProvider;
pub use authenticator::AuthenticatorProvider;
pub use cert_service::{CERT_SERVICE_SCOPES, CertServiceProvider};
pub use static_user::StaticUserProvider;
pub use system_auth::SystemAuthProvider;
pub use tenant_header::TenantHeaderProvider;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{MappingError, ResultExt};
use crate::model::{AuthDetails, ConsumerType, ObjectContext, ProviderKind, Tenant, TenantContext};
use crate::repository::TenantRepository;
use crate::request::RequestData;
use crate::scopes::{ScopesGetter, consumer_type_path};
use crate::utils::redact;

#[async_trait]
pub trait ObjectContextProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether this provider handles the request. Errors abort dispatch.
    async fn match_request(&self, data: &RequestData) -> Result<Option<AuthDetails>, MappingError>;

    async fn object_context(
        &self,
        data: &RequestData,
        details: &AuthDetails,
    ) -> Result<ObjectContext, MappingError>;
}

/// The closed set of provider strategies.
pub enum Provider {
    AccessLevel(AccessLevelProvider),
    TenantHeader(TenantHeaderProvider),
    CertService(CertServiceProvider),
    Authenticator(AuthenticatorProvider),
    StaticUser(StaticUserProvider),
    SystemAuth(SystemAuthProvider),
}

impl Provider {
    fn inner(&self) -> &dyn ObjectContextProvider {
        match self {
            Provider::AccessLevel(p) => p,
            Provider::TenantHeader(p) => p,
            Provider::CertService(p) => p,
            Provider::Authenticator(p) => p,
            Provider::StaticUser(p) => p,
            Provider::SystemAuth(p) => p,
        }
    }
}

#[async_trait]
impl ObjectContextProvider for Provider {
    fn kind(&self) -> ProviderKind {
        self.inner().kind()
    }

    async fn match_request(&self, data: &RequestData) -> Result<Option<AuthDetails>, MappingError> {
        self.inner().match_request(data).await
    }

    async fn object_context(
        &self,
        data: &RequestData,
        details: &AuthDetails,
    ) -> Result<ObjectContext, MappingError> {
        self.inner().object_context(data, details).await
    }
}

/// Look up an external tenant. A tenant that is not imported yet resolves
/// to an empty internal id; every other repository failure is returned.
pub(crate) async fn resolve_tenant(
    tenants: &dyn TenantRepository,
    external_tenant_id: &str,
    consumer_id: &str,
) -> Result<(TenantContext, Option<Tenant>), MappingError> {
    match tenants.get_by_external_tenant(external_tenant_id).await {
        Ok(tenant) => Ok((
            TenantContext::new(external_tenant_id, tenant.id.clone()),
            Some(tenant),
        )),
        Err(e) if e.is_not_found() => {
            warn!(
                "Tenant with external ID {} not found for consumer {}, continuing without internal tenant",
                external_tenant_id,
                redact(consumer_id)
            );
            Ok((TenantContext::unresolved(external_tenant_id), None))
        }
        Err(e) => Err(e.wrap(format!(
            "while getting external tenant mapping [ExternalTenantID={}]",
            external_tenant_id
        ))),
    }
}

/// Space-joined scopes configured for a consumer type.
pub(crate) fn consumer_type_scopes(
    scopes: &dyn ScopesGetter,
    consumer_type: ConsumerType,
) -> Result<String, MappingError> {
    scopes
        .get_required_scopes(&consumer_type_path(consumer_type))
        .map(|s| s.join(" "))
        .wrap_err_with(|| format!("failed to extract scopes for consumer with type {}", consumer_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tenants;

    #[tokio::test]
    async fn test_resolve_tenant_not_found_is_soft() {
        let repo = tenants();
        let (ctx, tenant) = resolve_tenant(&repo, "unknown", "consumer").await.unwrap();
        assert_eq!(ctx, TenantContext::unresolved("unknown"));
        assert!(tenant.is_none());

        let (ctx, tenant) = resolve_tenant(&repo, "X", "consumer").await.unwrap();
        assert_eq!(ctx, TenantContext::new("X", "T"));
        assert_eq!(tenant.unwrap().tenant_type, "account");
    }

    #[tokio::test]
    async fn test_resolve_tenant_other_errors_propagate() {
        let repo = crate::test_support::FailingTenantRepository;
        let err = resolve_tenant(&repo, "X", "consumer").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
        assert!(err
            .to_string()
            .starts_with("while getting external tenant mapping [ExternalTenantID=X]"));
    }
}
