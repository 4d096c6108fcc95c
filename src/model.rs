//! Data model shared by the providers and the dispatcher.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::authenticator::AuthenticatorConfig;
use crate::error::MappingError;
use crate::types::{ExternalTenantId, InternalTenantId, SystemAuthId};

/// Tenant label holding the data-center region of a tenant.
pub const REGION_LABEL: &str = "region";

/// How the caller's identity was asserted at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthFlow {
    Certificate,
    OAuth2,
    #[serde(rename = "JWT")]
    Jwt,
    OneTimeToken,
}

impl AuthFlow {
    pub fn is_certificate_flow(self) -> bool {
        self == AuthFlow::Certificate
    }

    pub fn is_oauth2_flow(self) -> bool {
        self == AuthFlow::OAuth2
    }

    pub fn is_one_time_token_flow(self) -> bool {
        self == AuthFlow::OneTimeToken
    }
}

impl fmt::Display for AuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthFlow::Certificate => "Certificate",
            AuthFlow::OAuth2 => "OAuth2",
            AuthFlow::Jwt => "JWT",
            AuthFlow::OneTimeToken => "OneTimeToken",
        };
        f.write_str(s)
    }
}

/// Kind of principal the request is executed on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumerType {
    Runtime,
    Application,
    IntegrationSystem,
    StaticUser,
    StaticGroup,
}

impl ConsumerType {
    /// Key of this consumer type inside the scopes document
    /// (`scopesPerConsumerType.<key>`).
    pub fn scopes_key(self) -> &'static str {
        match self {
            ConsumerType::Runtime => "runtime",
            ConsumerType::Application => "application",
            ConsumerType::IntegrationSystem => "integration_system",
            ConsumerType::StaticUser => "static_user",
            ConsumerType::StaticGroup => "static_group",
        }
    }

    /// Parse a consumer type as it appears in request claims. Accepts both
    /// the display name ("Integration System") and the scopes key
    /// ("integration_system").
    pub fn from_claim(value: &str) -> Option<Self> {
        [
            ConsumerType::Runtime,
            ConsumerType::Application,
            ConsumerType::IntegrationSystem,
            ConsumerType::StaticUser,
            ConsumerType::StaticGroup,
        ]
        .into_iter()
        .find(|ct| ct.to_string() == value || ct.scopes_key() == value)
    }
}

impl fmt::Display for ConsumerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsumerType::Runtime => "Runtime",
            ConsumerType::Application => "Application",
            ConsumerType::IntegrationSystem => "Integration System",
            ConsumerType::StaticUser => "Static User",
            ConsumerType::StaticGroup => "Static Group",
        };
        f.write_str(s)
    }
}

/// Identifies which provider produced an [`ObjectContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AccessLevel,
    TenantHeader,
    CertService,
    Authenticator,
    StaticUser,
    SystemAuth,
}

impl ProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::AccessLevel => "AccessLevelObjectContextProvider",
            ProviderKind::TenantHeader => "TenantHeaderObjectContextProvider",
            ProviderKind::CertService => "CertServiceObjectContextProvider",
            ProviderKind::Authenticator => "AuthenticatorObjectContextProvider",
            ProviderKind::StaticUser => "UserObjectContextProvider",
            ProviderKind::SystemAuth => "SystemAuthObjectContextProvider",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successful provider match. Immutable once produced.
#[derive(Debug, Clone)]
pub struct AuthDetails {
    pub auth_id: String,
    pub auth_flow: AuthFlow,
    pub region: Option<String>,
    pub cert_issuer: Option<String>,
    pub scope_prefix: Option<String>,
    pub authenticator: Option<Arc<AuthenticatorConfig>>,
}

impl AuthDetails {
    pub fn new(auth_id: impl Into<String>, auth_flow: AuthFlow) -> Self {
        Self {
            auth_id: auth_id.into(),
            auth_flow,
            region: None,
            cert_issuer: None,
            scope_prefix: None,
            authenticator: None,
        }
    }

    pub fn with_cert_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.cert_issuer = Some(issuer.into());
        self
    }
}

/// Tenant binding of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub external_tenant_id: ExternalTenantId,
    pub tenant_id: InternalTenantId,
}

impl TenantContext {
    pub fn new(external: impl Into<ExternalTenantId>, internal: impl Into<InternalTenantId>) -> Self {
        Self {
            external_tenant_id: external.into(),
            tenant_id: internal.into(),
        }
    }

    /// Tenant known externally but not imported locally yet.
    pub fn unresolved(external: impl Into<ExternalTenantId>) -> Self {
        Self {
            external_tenant_id: external.into(),
            tenant_id: InternalTenantId::default(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.tenant_id.is_empty()
    }
}

/// Resolved identity, tenant binding and scopes of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectContext {
    pub tenant: TenantContext,
    pub scopes: String,
    pub consumer_id: String,
    pub consumer_type: ConsumerType,
    pub auth_flow: AuthFlow,
    pub region: Option<String>,
    pub provider: ProviderKind,
    pub oauth_client_id: Option<String>,
}

/// Tenant record as returned by the tenant repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: InternalTenantId,
    pub external_tenant: ExternalTenantId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub tenant_type: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Tenant {
    pub fn region(&self) -> Option<String> {
        self.labels.get(REGION_LABEL).cloned()
    }
}

/// Runtime that authenticates with tokens from its own issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub token_issuer: String,
    /// Internal id of the tenant owning the runtime.
    pub tenant_id: InternalTenantId,
}

/// Object a [`SystemAuth`] credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceObjectType {
    Application,
    Runtime,
    IntegrationSystem,
}

impl ReferenceObjectType {
    pub fn consumer_type(self) -> ConsumerType {
        match self {
            ReferenceObjectType::Application => ConsumerType::Application,
            ReferenceObjectType::Runtime => ConsumerType::Runtime,
            ReferenceObjectType::IntegrationSystem => ConsumerType::IntegrationSystem,
        }
    }
}

/// Stored programmatic credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemAuth {
    pub id: SystemAuthId,
    #[serde(default)]
    pub tenant_id: Option<InternalTenantId>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub runtime_id: Option<String>,
    #[serde(default)]
    pub integration_system_id: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl SystemAuth {
    /// Resolve the single object this credential references.
    ///
    /// Exactly one of the reference ids must be set and non-empty.
    pub fn reference_object(&self) -> Result<(ReferenceObjectType, &str), MappingError> {
        fn set(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }

        let candidates = [
            (ReferenceObjectType::Application, set(&self.app_id)),
            (ReferenceObjectType::Runtime, set(&self.runtime_id)),
            (
                ReferenceObjectType::IntegrationSystem,
                set(&self.integration_system_id),
            ),
        ];

        let mut found = candidates
            .into_iter()
            .filter_map(|(ty, id)| id.map(|id| (ty, id)));

        match (found.next(), found.next()) {
            (Some(only), None) => Ok(only),
            _ => Err(MappingError::internal(format!(
                "unknown reference object type for system auth with id {}",
                self.id
            ))),
        }
    }
}
