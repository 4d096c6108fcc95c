// Core modules
pub mod api;
pub mod authenticator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod jwks;
pub mod model;
pub mod providers;
pub mod repository;
pub mod request;
pub mod runtime_mapping;
pub mod scopes;
pub mod statics;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export key types and functions
pub use authenticator::{AuthenticatorConfig, Authenticators};
pub use config::HydratorConfig;
pub use dispatcher::{Components, Dispatcher, REGISTRATION_ORDER};
pub use error::{ErrorKind, MappingError};
pub use model::{AuthDetails, AuthFlow, ConsumerType, ObjectContext, ProviderKind, TenantContext};
pub use request::{RequestBody, RequestData};
pub use types::{ExternalTenantId, InternalTenantId, SystemAuthId};

use std::sync::Arc;

use repository::{InMemoryRuntimeRepository, InMemorySystemAuthService, InMemoryTenantRepository};
use scopes::FileScopesGetter;
use statics::{StaticGroupRepository, StaticUserRepository};

/// Everything loaded from the files named in a [`HydratorConfig`].
pub struct Loaded {
    pub components: Components,
    pub scopes: Arc<FileScopesGetter>,
    pub runtimes: Arc<InMemoryRuntimeRepository>,
}

/// Load every table referenced by `config` and assemble the provider
/// collaborators.
pub fn load_components(config: &HydratorConfig) -> anyhow::Result<Loaded> {
    let scopes = Arc::new(FileScopesGetter::load(&config.scopes_path)?);
    let tenants = InMemoryTenantRepository::load(&config.tenants_path)?;
    let system_auths = InMemorySystemAuthService::load(&config.system_auths_path)?;
    let static_users = StaticUserRepository::load(&config.static_users_path)?;
    let static_groups = StaticGroupRepository::load(&config.static_groups_path)?;
    let runtimes = match &config.runtimes_path {
        Some(path) => InMemoryRuntimeRepository::load(path)?,
        None => InMemoryRuntimeRepository::default(),
    };

    let components = Components {
        tenants: Arc::new(tenants),
        system_auths: Arc::new(system_auths),
        scopes: scopes.clone(),
        static_users: Arc::new(static_users),
        static_groups: Arc::new(static_groups),
        authenticators: Authenticators::new(config.authenticators.clone()),
    };

    Ok(Loaded {
        components,
        scopes,
        runtimes: Arc::new(runtimes),
    })
}
