//! Shared fixtures for unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};

use crate::authenticator::{AuthenticatorConfig, Authenticators};
use crate::dispatcher::Components;
use crate::error::MappingError;
use crate::model::{SystemAuth, Tenant};
use crate::repository::{InMemorySystemAuthService, InMemoryTenantRepository, TenantRepository};
use crate::request::{RequestBody, RequestData};
use crate::scopes::FileScopesGetter;
use crate::statics::{StaticGroup, StaticGroupRepository, StaticUser, StaticUserRepository};
use crate::types::{ExternalTenantId, InternalTenantId, SystemAuthId};

pub fn tenant(external: &str, internal: &str, tenant_type: &str, region: Option<&str>) -> Tenant {
    let mut labels = BTreeMap::new();
    if let Some(region) = region {
        labels.insert("region".to_string(), region.to_string());
    }
    Tenant {
        id: InternalTenantId::new(internal),
        external_tenant: ExternalTenantId::new(external),
        name: None,
        tenant_type: tenant_type.to_string(),
        labels,
    }
}

/// Tenants: X→T (account), T1→IT1 (subaccount), T2→IT2 (subaccount),
/// ext-eu→int-eu (customer, region eu-1).
pub fn tenants() -> InMemoryTenantRepository {
    InMemoryTenantRepository::new(vec![
        tenant("X", "T", "account", None),
        tenant("T1", "IT1", "subaccount", None),
        tenant("T2", "IT2", "subaccount", None),
        tenant("ext-eu", "int-eu", "customer", Some("eu-1")),
    ])
}

pub struct FailingTenantRepository;

#[async_trait]
impl TenantRepository for FailingTenantRepository {
    async fn get_by_external_tenant(&self, _external_tenant: &str) -> Result<Tenant, MappingError> {
        Err(MappingError::internal("database unavailable"))
    }

    async fn get_by_internal_tenant(&self, _internal_tenant: &str) -> Result<Tenant, MappingError> {
        Err(MappingError::internal("database unavailable"))
    }
}

pub fn system_auth(
    id: &str,
    tenant_id: Option<&str>,
    app: Option<&str>,
    runtime: Option<&str>,
    integration_system: Option<&str>,
) -> SystemAuth {
    SystemAuth {
        id: SystemAuthId::new(id),
        tenant_id: tenant_id.map(InternalTenantId::new),
        app_id: app.map(String::from),
        runtime_id: runtime.map(String::from),
        integration_system_id: integration_system.map(String::from),
        value: None,
    }
}

/// Credentials: sa-app (Application app-1, tenant T), sa-rt (Runtime rt-1,
/// tenant IT1), sa-is (Integration System is-1), sa-bad (no reference),
/// sa-untenanted (Application without tenant).
pub fn system_auths() -> InMemorySystemAuthService {
    InMemorySystemAuthService::new(vec![
        system_auth("sa-app", Some("T"), Some("app-1"), None, None),
        system_auth("sa-rt", Some("IT1"), None, Some("rt-1"), None),
        system_auth("sa-is", None, None, None, Some("is-1")),
        system_auth("sa-bad", Some("T"), None, None, None),
        system_auth("sa-untenanted", None, Some("app-2"), None, None),
    ])
}

pub fn scopes_document() -> Value {
    json!({
        "scopesPerConsumerType": {
            "runtime": ["runtime:read", "runtime:write"],
            "application": ["application:read"],
            "integration_system": ["application:read", "runtime:read", "tenant:read"]
        }
    })
}

pub fn static_users() -> StaticUserRepository {
    StaticUserRepository::new(vec![
        StaticUser {
            username: "alice".to_string(),
            tenants: vec!["T1".to_string()],
            scopes: vec!["x:read".to_string()],
        },
        StaticUser {
            username: "bob".to_string(),
            tenants: vec![],
            scopes: vec!["y:read".to_string(), "y:write".to_string()],
        },
    ])
    .unwrap()
}

pub fn static_groups() -> StaticGroupRepository {
    StaticGroupRepository::new(vec![
        StaticGroup {
            groupname: "readers".to_string(),
            tenants: vec![],
            scopes: vec!["a:read".to_string(), "b:read".to_string()],
        },
        StaticGroup {
            groupname: "writers".to_string(),
            tenants: vec![],
            scopes: vec!["b:read".to_string(), "b:write".to_string()],
        },
    ])
    .unwrap()
}

pub fn authenticator() -> AuthenticatorConfig {
    serde_json::from_value(json!({
        "name": "corp-idp",
        "trustedIssuers": [
            {"domainUrl": "accounts.example.com", "scopePrefix": "corp.", "region": "eu-1"}
        ],
        "attributes": {
            "uniqueAttribute": {"key": "extra.idp", "value": "corp"},
            "tenantAttribute": {"key": "extra.tenant"},
            "identityAttribute": {"key": "user_name"},
            "clientIdAttribute": {"key": "azp"}
        }
    }))
    .unwrap()
}

pub fn components() -> Components {
    Components {
        tenants: Arc::new(tenants()),
        system_auths: Arc::new(system_auths()),
        scopes: Arc::new(FileScopesGetter::from_value(scopes_document())),
        static_users: Arc::new(static_users()),
        static_groups: Arc::new(static_groups()),
        authenticators: Authenticators::new(vec![authenticator()]),
    }
}

/// Request with the given `extra` claims and `(name, value)` headers.
pub fn request(extra: Value, headers: &[(&str, &str)]) -> RequestData {
    let mut header = HeaderMap::new();
    for (name, value) in headers {
        header.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    RequestData::new(
        RequestBody {
            subject: "subject".to_string(),
            extra: extra.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        },
        header,
    )
}
