//! Provider dispatch.
//!
//! Providers are consulted in a fixed order and the first one whose match
//! step succeeds resolves the request.

use std::sync::Arc;

use tracing::{debug, info};

use crate::authenticator::Authenticators;
use crate::error::MappingError;
use crate::model::{ObjectContext, ProviderKind};
use crate::providers::{
    AccessLevelProvider, AuthenticatorProvider, CertServiceProvider, ObjectContextProvider,
    Provider, StaticUserProvider, SystemAuthProvider, TenantHeaderProvider,
};
use crate::repository::{SystemAuthService, TenantRepository};
use crate::request::{RequestBody, RequestData, fold_object_context};
use crate::scopes::ScopesGetter;
use crate::statics::{StaticGroupRepository, StaticUserRepository};
use crate::utils::redact;

/// Order in which providers are consulted. The certificate-service variants
/// must precede `CertService`, and `Authenticator` must precede `StaticUser`.
pub const REGISTRATION_ORDER: [ProviderKind; 6] = [
    ProviderKind::AccessLevel,
    ProviderKind::TenantHeader,
    ProviderKind::CertService,
    ProviderKind::Authenticator,
    ProviderKind::StaticUser,
    ProviderKind::SystemAuth,
];

/// Collaborators the providers are built from.
#[derive(Clone)]
pub struct Components {
    pub tenants: Arc<dyn TenantRepository>,
    pub system_auths: Arc<dyn SystemAuthService>,
    pub scopes: Arc<dyn ScopesGetter>,
    pub static_users: Arc<StaticUserRepository>,
    pub static_groups: Arc<StaticGroupRepository>,
    pub authenticators: Authenticators,
}

impl Components {
    fn build(&self, kind: ProviderKind) -> Provider {
        match kind {
            ProviderKind::AccessLevel => Provider::AccessLevel(AccessLevelProvider::new(
                self.tenants.clone(),
                self.scopes.clone(),
            )),
            ProviderKind::TenantHeader => Provider::TenantHeader(TenantHeaderProvider::new(
                self.tenants.clone(),
                self.scopes.clone(),
            )),
            ProviderKind::CertService => {
                Provider::CertService(CertServiceProvider::new(self.tenants.clone()))
            }
            ProviderKind::Authenticator => Provider::Authenticator(AuthenticatorProvider::new(
                self.authenticators.clone(),
                self.tenants.clone(),
            )),
            ProviderKind::StaticUser => Provider::StaticUser(StaticUserProvider::new(
                self.static_users.clone(),
                self.static_groups.clone(),
                self.authenticators.clone(),
                self.tenants.clone(),
            )),
            ProviderKind::SystemAuth => Provider::SystemAuth(SystemAuthProvider::new(
                self.system_auths.clone(),
                self.tenants.clone(),
                self.scopes.clone(),
            )),
        }
    }
}

pub struct Dispatcher {
    providers: Vec<Provider>,
}

impl Dispatcher {
    /// Dispatcher over an explicit provider list, consulted in the given order.
    pub fn new(providers: Vec<Provider>) -> Self {
        Self { providers }
    }

    /// Dispatcher with every provider registered in [`REGISTRATION_ORDER`].
    pub fn from_components(components: &Components) -> Self {
        let providers = REGISTRATION_ORDER
            .iter()
            .map(|kind| components.build(*kind))
            .collect();
        Self::new(providers)
    }

    pub fn provider_kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// Resolve the object context of a request.
    ///
    /// A failing match step aborts dispatch: later providers are not tried.
    pub async fn dispatch(&self, data: &RequestData) -> Result<ObjectContext, MappingError> {
        for provider in &self.providers {
            let Some(details) = provider.match_request(data).await? else {
                continue;
            };

            debug!(
                "Provider {} matched request with auth flow {}",
                provider.kind(),
                details.auth_flow
            );
            let ctx = provider.object_context(data, &details).await?;
            info!(
                "Resolved {} consumer {} via {} [tenant={}]",
                ctx.consumer_type,
                redact(&ctx.consumer_id),
                ctx.provider,
                ctx.tenant.tenant_id
            );
            return Ok(ctx);
        }

        Err(MappingError::unauthorized("unable to determine auth identity"))
    }

    /// Dispatch and fold the resolved context into the request body.
    pub async fn hydrate(&self, data: RequestData) -> Result<RequestBody, MappingError> {
        let ctx = self.dispatch(&data).await?;
        Ok(fold_object_context(data.body, &ctx))
    }
}
