use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{StaticRecord, StaticTable};

/// Named bundle of scopes granted to users that declare membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticGroup {
    pub groupname: String,
    #[serde(default)]
    pub tenants: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StaticRecord for StaticGroup {
    const KIND: &'static str = "static group";

    fn name(&self) -> &str {
        &self.groupname
    }
}

pub type StaticGroupRepository = StaticTable<StaticGroup>;

impl StaticTable<StaticGroup> {
    /// Groups matching `names`, in request order. Unknown names are skipped.
    pub fn get_all(&self, names: &[String]) -> Vec<StaticGroup> {
        names
            .iter()
            .filter_map(|name| {
                let group = self.find(name);
                if group.is_none() {
                    warn!("Static group {} not found, skipping", name);
                }
                group
            })
            .collect()
    }
}
