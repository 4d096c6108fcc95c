use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{ObjectContextProvider, consumer_type_scopes, resolve_tenant};
use crate::error::{MappingError, ResultExt};
use crate::model::{
    AuthDetails, AuthFlow, ObjectContext, ProviderKind, ReferenceObjectType, SystemAuth,
    TenantContext,
};
use crate::repository::{SystemAuthService, TenantRepository};
use crate::request::RequestData;
use crate::scopes::ScopesGetter;
use crate::types::InternalTenantId;
use crate::utils::redact;

/// Handles programmatic credentials: OAuth2 client credentials, client
/// certificates and one-time tokens issued for an Application, a Runtime
/// or an Integration System.
pub struct SystemAuthProvider {
    system_auths: Arc<dyn SystemAuthService>,
    tenants: Arc<dyn TenantRepository>,
    scopes: Arc<dyn ScopesGetter>,
}

struct Resolved {
    tenant: TenantContext,
    scopes: String,
    region: Option<String>,
}

impl SystemAuthProvider {
    pub fn new(
        system_auths: Arc<dyn SystemAuthService>,
        tenants: Arc<dyn TenantRepository>,
        scopes: Arc<dyn ScopesGetter>,
    ) -> Self {
        Self {
            system_auths,
            tenants,
            scopes,
        }
    }

    /// Integration systems are cross-tenant: both tenant and scopes come
    /// from the request.
    async fn integration_system(
        &self,
        data: &RequestData,
        details: &AuthDetails,
    ) -> Result<Resolved, MappingError> {
        let scopes = data.get_scopes().wrap_err("while fetching scopes")?;

        let (tenant, region) = match data.get_external_tenant_id() {
            Err(e) if e.is_key_does_not_exist() => (TenantContext::default(), None),
            Err(e) => return Err(e),
            Ok(external_tenant_id) => {
                let (tenant, record) =
                    resolve_tenant(self.tenants.as_ref(), &external_tenant_id, &details.auth_id)
                        .await?;
                (tenant, record.and_then(|t| t.region()))
            }
        };

        Ok(Resolved {
            tenant,
            scopes,
            region,
        })
    }

    /// Applications and runtimes are bound to the tenant stored with their
    /// credential.
    async fn tenant_bound(
        &self,
        data: &RequestData,
        details: &AuthDetails,
        auth: &SystemAuth,
        ref_type: ReferenceObjectType,
    ) -> Result<Resolved, MappingError> {
        let stored: InternalTenantId = auth
            .tenant_id
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MappingError::internal("system auth tenant id cannot be nil"))?;

        let scopes = if details.auth_flow.is_oauth2_flow() {
            data.get_scopes().wrap_err("while fetching scopes")?
        } else {
            consumer_type_scopes(self.scopes.as_ref(), ref_type.consumer_type())?
        };

        let (tenant, region) = match data.get_external_tenant_id() {
            Err(e) if e.is_key_does_not_exist() => (
                TenantContext {
                    external_tenant_id: Default::default(),
                    tenant_id: stored,
                },
                None,
            ),
            Err(e) => return Err(e),
            Ok(external_tenant_id) => {
                let (tenant, record) =
                    resolve_tenant(self.tenants.as_ref(), &external_tenant_id, &details.auth_id)
                        .await?;
                if tenant.is_resolved() && tenant.tenant_id != stored {
                    warn!(
                        "Tenant mismatch for consumer {}: requested tenant {} does not own the credential, continuing without tenant",
                        redact(&details.auth_id),
                        external_tenant_id
                    );
                    (TenantContext::unresolved(external_tenant_id), None)
                } else {
                    (tenant, record.and_then(|t| t.region()))
                }
            }
        };

        Ok(Resolved {
            tenant,
            scopes,
            region,
        })
    }
}

#[async_trait]
impl ObjectContextProvider for SystemAuthProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SystemAuth
    }

    async fn match_request(&self, data: &RequestData) -> Result<Option<AuthDetails>, MappingError> {
        // Tokens already claimed by an external authenticator carry users.
        if data.authenticator_coordinates()?.is_some() {
            return Ok(None);
        }
        data.classify_auth_flow()
    }

    async fn object_context(
        &self,
        data: &RequestData,
        details: &AuthDetails,
    ) -> Result<ObjectContext, MappingError> {
        let auth = self
            .system_auths
            .get_global(&details.auth_id)
            .await
            .wrap_err_with(|| format!("while retrieving system auth with id {}", details.auth_id))?;

        let (ref_type, ref_id) = auth.reference_object()?;

        let resolved = match ref_type {
            ReferenceObjectType::IntegrationSystem => self.integration_system(data, details).await?,
            ReferenceObjectType::Application | ReferenceObjectType::Runtime => {
                self.tenant_bound(data, details, &auth, ref_type).await?
            }
        };

        Ok(ObjectContext {
            tenant: resolved.tenant,
            scopes: resolved.scopes,
            consumer_id: ref_id.to_string(),
            consumer_type: ref_type.consumer_type(),
            auth_flow: details.auth_flow,
            region: resolved.region,
            provider: self.kind(),
            oauth_client_id: (details.auth_flow == AuthFlow::OAuth2).then(|| details.auth_id.clone()),
        })
    }
}
