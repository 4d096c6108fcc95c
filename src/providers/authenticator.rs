use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ObjectContextProvider, resolve_tenant};
use crate::authenticator::Authenticators;
use crate::error::{MappingError, ResultExt};
use crate::model::{AuthDetails, AuthFlow, ConsumerType, ObjectContext, ProviderKind};
use crate::repository::TenantRepository;
use crate::request::RequestData;
use crate::request::keys::{EXTERNAL_TENANT_KEY, SCOPES_KEY};

/// Handles human users whose token was issued by a configured external
/// authenticator.
pub struct AuthenticatorProvider {
    authenticators: Authenticators,
    tenants: Arc<dyn TenantRepository>,
}

impl AuthenticatorProvider {
    pub fn new(authenticators: Authenticators, tenants: Arc<dyn TenantRepository>) -> Self {
        Self {
            authenticators,
            tenants,
        }
    }
}

/// Scopes from the `scope` claim with the issuer prefix removed. A missing
/// or non-list claim grants nothing; a list with non-string entries is an
/// error.
fn prefixed_scopes(data: &RequestData, prefix: &str) -> Result<Vec<String>, MappingError> {
    let Some(Value::Array(items)) = data.extra_value(SCOPES_KEY) else {
        return Ok(Vec::new());
    };

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.strip_prefix(prefix).unwrap_or(s).to_string())
                .ok_or_else(|| MappingError::internal("unable to cast the value to a string type"))
        })
        .collect::<Result<Vec<_>, _>>()
        .wrap_err_with(|| format!("while parsing the value for key={}", SCOPES_KEY))
}

#[async_trait]
impl ObjectContextProvider for AuthenticatorProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Authenticator
    }

    async fn match_request(&self, data: &RequestData) -> Result<Option<AuthDetails>, MappingError> {
        let Some((authn, index)) = self.authenticators.claiming(data)? else {
            return Ok(None);
        };

        let identity = match data.get_string(&authn.attributes.identity_attribute.key) {
            Ok(identity) => identity,
            Err(e) if e.is_key_does_not_exist() => {
                return Err(MappingError::invalid_data(format!(
                    "missing identity attribute from \"{}\" authenticator token",
                    authn.name
                )));
            }
            Err(e) => return Err(e),
        };

        let issuer = authn.trusted_issuer(index).ok_or_else(|| {
            MappingError::invalid_data(format!(
                "authenticator \"{}\" has no trusted issuer with index {}",
                authn.name, index
            ))
        })?;

        let mut details = AuthDetails::new(identity, AuthFlow::Jwt);
        details.scope_prefix = Some(issuer.scope_prefix.clone());
        details.region = issuer.region.clone();
        details.authenticator = Some(authn);
        Ok(Some(details))
    }

    async fn object_context(
        &self,
        data: &RequestData,
        details: &AuthDetails,
    ) -> Result<ObjectContext, MappingError> {
        let authn = details
            .authenticator
            .as_ref()
            .ok_or_else(|| MappingError::internal("missing authenticator in auth details"))?;

        let prefix = details.scope_prefix.as_deref().unwrap_or_default();
        let scopes = prefixed_scopes(data, prefix)?;

        let tenant_key = &authn.attributes.tenant_attribute.key;
        let external_tenant_id = match data.get_string(tenant_key) {
            Ok(id) => id,
            Err(e) if e.is_key_does_not_exist() => data
                .header_value(EXTERNAL_TENANT_KEY)
                .map(str::to_string)
                .ok_or_else(|| {
                    MappingError::invalid_data(format!(
                        "tenant attribute \"{}\" missing from {} authenticator token",
                        tenant_key, authn.name
                    ))
                })?,
            Err(e) => return Err(e),
        };

        let (tenant, record) =
            resolve_tenant(self.tenants.as_ref(), &external_tenant_id, &details.auth_id).await?;

        let oauth_client_id = authn
            .attributes
            .client_id_attribute
            .as_ref()
            .and_then(|attr| data.get_string(&attr.key).ok());

        Ok(ObjectContext {
            tenant,
            scopes: scopes.join(" "),
            consumer_id: details.auth_id.clone(),
            consumer_type: ConsumerType::StaticUser,
            auth_flow: details.auth_flow,
            region: details
                .region
                .clone()
                .or_else(|| record.and_then(|t| t.region())),
            provider: self.kind(),
            oauth_client_id,
        })
    }
}
