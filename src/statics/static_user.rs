use serde::{Deserialize, Serialize};

use super::{StaticRecord, StaticTable};
use crate::error::MappingError;

/// Pre-provisioned human identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticUser {
    pub username: String,
    /// External tenant ids the user may act on. Empty means unrestricted.
    #[serde(default)]
    pub tenants: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StaticUser {
    pub fn allows_tenant(&self, external_tenant_id: &str) -> bool {
        self.tenants.is_empty() || self.tenants.iter().any(|t| t == external_tenant_id)
    }
}

impl StaticRecord for StaticUser {
    const KIND: &'static str = "static user";

    fn name(&self) -> &str {
        &self.username
    }
}

pub type StaticUserRepository = StaticTable<StaticUser>;

impl StaticTable<StaticUser> {
    /// Unknown users are Unauthorized: NotFound is reserved for tenant
    /// lookups, which callers recover from.
    pub fn get(&self, username: &str) -> Result<StaticUser, MappingError> {
        self.find(username).ok_or_else(|| {
            MappingError::unauthorized(format!("static user {} is not provisioned", username))
        })
    }
}
