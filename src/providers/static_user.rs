use std::sync::Arc;

use async_trait::async_trait;

use super::{ObjectContextProvider, resolve_tenant};
use crate::authenticator::Authenticators;
use crate::error::{MappingError, ResultExt};
use crate::model::{AuthDetails, AuthFlow, ConsumerType, ObjectContext, ProviderKind, TenantContext};
use crate::repository::TenantRepository;
use crate::request::RequestData;
use crate::request::keys::USERNAME_KEY;
use crate::statics::{StaticGroup, StaticGroupRepository, StaticUser, StaticUserRepository};

/// Handles pre-provisioned static users, optionally through static groups.
pub struct StaticUserProvider {
    users: Arc<StaticUserRepository>,
    groups: Arc<StaticGroupRepository>,
    authenticators: Authenticators,
    tenants: Arc<dyn TenantRepository>,
}

impl StaticUserProvider {
    pub fn new(
        users: Arc<StaticUserRepository>,
        groups: Arc<StaticGroupRepository>,
        authenticators: Authenticators,
        tenants: Arc<dyn TenantRepository>,
    ) -> Self {
        Self {
            users,
            groups,
            authenticators,
            tenants,
        }
    }
}

/// Deduplicated union of group scopes, in first-seen order.
fn union_scopes(groups: &[StaticGroup]) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for scope in groups.iter().flat_map(|g| g.scopes.iter()) {
        if !scopes.contains(scope) {
            scopes.push(scope.clone());
        }
    }
    scopes
}

#[async_trait]
impl ObjectContextProvider for StaticUserProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::StaticUser
    }

    async fn match_request(&self, data: &RequestData) -> Result<Option<AuthDetails>, MappingError> {
        let username = match data.get_string(USERNAME_KEY) {
            Ok(username) => username,
            Err(e) if e.is_key_does_not_exist() => return Ok(None),
            Err(e) => return Err(e),
        };

        if self.authenticators.claiming(data)?.is_some() {
            return Ok(None);
        }

        Ok(Some(AuthDetails::new(username, AuthFlow::Jwt)))
    }

    async fn object_context(
        &self,
        data: &RequestData,
        details: &AuthDetails,
    ) -> Result<ObjectContext, MappingError> {
        let username = details.auth_id.as_str();

        let group_scopes = union_scopes(&self.groups.get_all(&data.get_user_groups()));
        let (scopes, consumer_type, user): (Vec<String>, ConsumerType, Option<StaticUser>) =
            if group_scopes.is_empty() {
                let user = self.users.get(username).wrap_err_with(|| {
                    format!("while searching for a static user with username {}", username)
                })?;
                (user.scopes.clone(), ConsumerType::StaticUser, Some(user))
            } else {
                (group_scopes, ConsumerType::StaticGroup, None)
            };

        let (tenant, region) = match data.get_external_tenant_id() {
            Err(e) if e.is_key_does_not_exist() => (TenantContext::default(), None),
            Err(e) => return Err(e),
            Ok(external_tenant_id) => {
                if let Some(user) = &user {
                    if !user.allows_tenant(&external_tenant_id) {
                        return Err(MappingError::unauthorized(format!(
                            "Static tenant with username: {} mismatch external tenant: {}",
                            username, external_tenant_id
                        )));
                    }
                }
                let (tenant, record) =
                    resolve_tenant(self.tenants.as_ref(), &external_tenant_id, username).await?;
                (tenant, record.and_then(|t| t.region()))
            }
        };

        Ok(ObjectContext {
            tenant,
            scopes: scopes.join(" "),
            consumer_id: username.to_string(),
            consumer_type,
            auth_flow: details.auth_flow,
            region,
            provider: self.kind(),
            oauth_client_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{authenticator, request, static_groups, static_users, tenants};
    use serde_json::{Value, json};

    fn provider() -> StaticUserProvider {
        StaticUserProvider::new(
            Arc::new(static_users()),
            Arc::new(static_groups()),
            Authenticators::new(vec![authenticator()]),
            Arc::new(tenants()),
        )
    }

    async fn resolve(extra: Value) -> Result<ObjectContext, MappingError> {
        let p = provider();
        let data = request(extra, &[]);
        let details = p.match_request(&data).await?.expect("provider should match");
        p.object_context(&data, &details).await
    }

    #[tokio::test]
    async fn test_match_defers_to_authenticators() {
        let p = provider();
        let data = request(json!({"name": "alice"}), &[]);
        assert_eq!(p.match_request(&data).await.unwrap().unwrap().auth_id, "alice");

        let data = request(json!({"name": "alice", "extra": {"idp": "corp"}}), &[]);
        assert!(p.match_request(&data).await.unwrap().is_none());

        let data = request(
            json!({
                "name": "alice",
                "authenticator_coordinates": {"name": "unknown-idp", "index": 0}
            }),
            &[],
        );
        assert!(p.match_request(&data).await.unwrap().is_some());

        assert!(p.match_request(&request(json!({}), &[])).await.unwrap().is_none());
        assert!(p.match_request(&request(json!({"name": 5}), &[])).await.is_err());
    }

    #[tokio::test]
    async fn test_alice_in_allowed_tenant() {
        let ctx = resolve(json!({"name": "alice", "tenant": "T1"})).await.unwrap();
        assert_eq!(ctx.consumer_type, ConsumerType::StaticUser);
        assert_eq!(ctx.scopes, "x:read");
        assert_eq!(ctx.tenant, TenantContext::new("T1", "IT1"));
        assert_eq!(ctx.consumer_id, "alice");
    }

    #[tokio::test]
    async fn test_alice_outside_allow_list_is_hard_error() {
        let err = resolve(json!({"name": "alice", "tenant": "T2"})).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(
            err.to_string(),
            "Unauthorized [reason=Static tenant with username: alice mismatch external tenant: T2]"
        );
    }

    #[tokio::test]
    async fn test_no_tenant_claim_yields_empty_tenant() {
        let ctx = resolve(json!({"name": "bob"})).await.unwrap();
        assert_eq!(ctx.tenant, TenantContext::default());
        assert_eq!(ctx.scopes, "y:read y:write");
    }

    #[tokio::test]
    async fn test_unknown_tenant_for_unrestricted_user_is_soft() {
        let ctx = resolve(json!({"name": "bob", "tenant": "not-imported"})).await.unwrap();
        assert_eq!(ctx.tenant, TenantContext::unresolved("not-imported"));
    }

    #[tokio::test]
    async fn test_group_scopes_union_is_deduplicated() {
        let ctx = resolve(json!({
            "name": "someone",
            "groups": ["readers", "writers", "ghosts"],
            "tenant": "T2"
        }))
        .await
        .unwrap();
        assert_eq!(ctx.scopes, "a:read b:read b:write");
        assert_eq!(ctx.consumer_type, ConsumerType::StaticGroup);
        assert_eq!(ctx.tenant, TenantContext::new("T2", "IT2"));
    }

    #[tokio::test]
    async fn test_unmatched_groups_fall_back_to_user() {
        let ctx = resolve(json!({"name": "alice", "groups": ["ghosts"], "tenant": "T1"}))
            .await
            .unwrap();
        assert_eq!(ctx.scopes, "x:read");
        assert_eq!(ctx.consumer_type, ConsumerType::StaticUser);

        let err = resolve(json!({"name": "nobody"})).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(err
            .to_string()
            .starts_with("while searching for a static user with username nobody"));
    }
}
