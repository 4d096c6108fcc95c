//! Collaborator interfaces for tenant, credential and runtime lookup.
//!
//! Both lookups are async and cancelled by dropping the returned future. The
//! engine performs no retries. The in-memory implementations back the
//! binary's file-based deployment and the tests.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::MappingError;
use crate::model::{Runtime, SystemAuth, Tenant};
use crate::types::{ExternalTenantId, InternalTenantId, SystemAuthId};

#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Tenant by external id. Missing tenants yield a NotFound error.
    async fn get_by_external_tenant(&self, external_tenant: &str) -> Result<Tenant, MappingError>;

    /// Tenant by internal id. Missing tenants yield a NotFound error.
    async fn get_by_internal_tenant(&self, internal_tenant: &str) -> Result<Tenant, MappingError>;
}

#[async_trait]
pub trait SystemAuthService: Send + Sync {
    /// Credential by id, regardless of the tenant it belongs to.
    async fn get_global(&self, id: &str) -> Result<SystemAuth, MappingError>;
}

#[async_trait]
pub trait RuntimeRepository: Send + Sync {
    /// Runtime whose tokens are issued by `issuer`.
    async fn get_by_token_issuer(&self, issuer: &str) -> Result<Runtime, MappingError>;
}

#[derive(Debug, Default)]
pub struct InMemoryTenantRepository {
    tenants: HashMap<ExternalTenantId, Tenant>,
    external_by_internal: HashMap<InternalTenantId, ExternalTenantId>,
}

impl InMemoryTenantRepository {
    pub fn new(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let tenants: HashMap<_, _> = tenants
            .into_iter()
            .map(|t| (t.external_tenant.clone(), t))
            .collect();
        let external_by_internal = tenants
            .values()
            .map(|t| (t.id.clone(), t.external_tenant.clone()))
            .collect();
        Self {
            tenants,
            external_by_internal,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let tenants: Vec<Tenant> = read_json(path.as_ref())?;
        Ok(Self::new(tenants))
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn get_by_external_tenant(&self, external_tenant: &str) -> Result<Tenant, MappingError> {
        self.tenants
            .get(external_tenant)
            .cloned()
            .ok_or_else(|| MappingError::not_found("tenant", external_tenant))
    }

    async fn get_by_internal_tenant(&self, internal_tenant: &str) -> Result<Tenant, MappingError> {
        self.external_by_internal
            .get(internal_tenant)
            .and_then(|external| self.tenants.get(external))
            .cloned()
            .ok_or_else(|| MappingError::not_found("tenant", internal_tenant))
    }
}

#[derive(Debug, Default)]
pub struct InMemorySystemAuthService {
    auths: HashMap<SystemAuthId, SystemAuth>,
}

impl InMemorySystemAuthService {
    pub fn new(auths: impl IntoIterator<Item = SystemAuth>) -> Self {
        Self {
            auths: auths.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let auths: Vec<SystemAuth> = read_json(path.as_ref())?;
        Ok(Self::new(auths))
    }

    pub fn len(&self) -> usize {
        self.auths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auths.is_empty()
    }
}

#[async_trait]
impl SystemAuthService for InMemorySystemAuthService {
    async fn get_global(&self, id: &str) -> Result<SystemAuth, MappingError> {
        self.auths
            .get(id)
            .cloned()
            .ok_or_else(|| MappingError::not_found("system auth", id))
    }
}

/// Runtimes indexed by the issuer of their tokens.
#[derive(Debug, Default)]
pub struct InMemoryRuntimeRepository {
    by_issuer: HashMap<String, Runtime>,
}

impl InMemoryRuntimeRepository {
    pub fn new(runtimes: impl IntoIterator<Item = Runtime>) -> Self {
        Self {
            by_issuer: runtimes
                .into_iter()
                .map(|r| (r.token_issuer.clone(), r))
                .collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let runtimes: Vec<Runtime> = read_json(path.as_ref())?;
        Ok(Self::new(runtimes))
    }

    pub fn len(&self) -> usize {
        self.by_issuer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_issuer.is_empty()
    }
}

#[async_trait]
impl RuntimeRepository for InMemoryRuntimeRepository {
    async fn get_by_token_issuer(&self, issuer: &str) -> Result<Runtime, MappingError> {
        self.by_issuer
            .get(issuer)
            .cloned()
            .ok_or_else(|| MappingError::not_found("runtime", issuer))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
