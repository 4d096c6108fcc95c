//! Provider-agnostic view of an inbound tenant-mapping request.
//!
//! The gateway forwards `{subject, extra, header}` as JSON together with the
//! original HTTP headers. Providers read claims and headers exclusively
//! through [`RequestData`] so that "absent" is reported uniformly as
//! [`MappingError::KeyDoesNotExist`].

pub mod keys;

use std::collections::BTreeMap;

use http::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::authenticator::Coordinates;
use crate::error::{MappingError, ResultExt};
use crate::model::{AuthDetails, AuthFlow, ConsumerType, ObjectContext};
use crate::utils::lookup_claim;

use keys::*;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// JSON body of a tenant-mapping request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub extra: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub header: BTreeMap<String, Vec<String>>,
}

/// Request body plus the headers of the HTTP request that carried it.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub body: RequestBody,
    pub header: HeaderMap,
}

impl RequestData {
    pub fn new(body: RequestBody, header: HeaderMap) -> Self {
        Self { body, header }
    }

    /// Parse a raw JSON body.
    pub fn from_slice(bytes: &[u8], header: HeaderMap) -> Result<Self, MappingError> {
        let body: RequestBody = serde_json::from_slice(bytes)
            .map_err(|e| MappingError::invalid_data(format!("while decoding request body: {}", e)))?;
        Ok(Self::new(body, header))
    }

    /// First value of a header, looking at the forwarded header map first
    /// and at the carrying request second. Names are case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        let forwarded = self
            .body
            .header
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
            .filter(|v| !v.is_empty());

        forwarded.or_else(|| {
            self.header
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        })
    }

    pub fn extra_value(&self, key: &str) -> Option<&Value> {
        lookup_claim(&self.body.extra, key)
    }

    pub fn has_extra(&self, key: &str) -> bool {
        self.extra_value(key).is_some()
    }

    /// String claim at `key` (dotted paths allowed).
    pub fn get_string(&self, key: &str) -> Result<String, MappingError> {
        match self.extra_value(key) {
            None => Err(MappingError::KeyDoesNotExist(key.to_string())),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(cast_error("string").wrap(format!("while parsing the value for key={}", key))),
        }
    }

    /// List-of-strings claim at `key`. Any non-string element is an error.
    pub fn get_string_list(&self, key: &str) -> Result<Vec<String>, MappingError> {
        let value = self
            .extra_value(key)
            .ok_or_else(|| MappingError::KeyDoesNotExist(key.to_string()))?;
        let items = value
            .as_array()
            .ok_or_else(|| cast_error("list"))
            .wrap_err_with(|| format!("while parsing the value for key={}", key))?;

        items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| cast_error("string")))
            .collect::<Result<Vec<_>, _>>()
            .wrap_err_with(|| format!("while parsing the value for key={}", key))
    }

    /// External tenant id from the `tenant` claim, falling back to the
    /// `tenant` header.
    pub fn get_external_tenant_id(&self) -> Result<String, MappingError> {
        match self.get_string(EXTERNAL_TENANT_KEY) {
            Err(e) if e.is_key_does_not_exist() => self
                .header_value(EXTERNAL_TENANT_KEY)
                .map(str::to_string)
                .ok_or(e),
            other => other,
        }
    }

    /// Space-joined scopes from the `scope` claim (string or list), falling
    /// back to the `scope` header.
    pub fn get_scopes(&self) -> Result<String, MappingError> {
        match self.extra_value(SCOPES_KEY) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Array(_)) => Ok(self.get_string_list(SCOPES_KEY)?.join(" ")),
            Some(_) => Err(cast_error("string")
                .wrap(format!("while parsing the value for key={}", SCOPES_KEY))),
            None => self
                .header_value(SCOPES_KEY)
                .map(str::to_string)
                .ok_or_else(|| MappingError::KeyDoesNotExist(SCOPES_KEY.to_string())),
        }
    }

    /// Group names from the `groups` claim; non-string entries are ignored.
    pub fn get_user_groups(&self) -> Vec<String> {
        self.string_entries(USER_GROUPS_KEY)
    }

    /// Tenant access levels declared by a certificate caller.
    pub fn get_access_levels(&self) -> Vec<String> {
        self.string_entries(ACCESS_LEVELS_KEY)
    }

    fn string_entries(&self, key: &str) -> Vec<String> {
        self.extra_value(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Consumer type declared in the `consumer_type` claim, or `default`
    /// when the claim is absent.
    pub fn get_consumer_type(&self, default: ConsumerType) -> Result<ConsumerType, MappingError> {
        match self.get_string(CONSUMER_TYPE_KEY) {
            Ok(raw) => ConsumerType::from_claim(&raw)
                .ok_or_else(|| MappingError::internal(format!("unknown consumer type {}", raw))),
            Err(e) if e.is_key_does_not_exist() => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Coordinates of the authenticator that already validated the token.
    pub fn authenticator_coordinates(&self) -> Result<Option<Coordinates>, MappingError> {
        match self.body.extra.get(AUTHENTICATOR_COORDINATES_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone()).map(Some).map_err(|e| {
                MappingError::invalid_data(format!("malformed authenticator coordinates: {}", e))
            }),
        }
    }

    pub fn cert_client_id(&self) -> Option<&str> {
        self.header_value(CLIENT_ID_CERT_HEADER)
    }

    pub fn cert_issuer(&self) -> Option<&str> {
        self.header_value(CLIENT_CERT_ISSUER_HEADER)
    }

    /// Whether the request carries a client certificate minted by the
    /// external certificate service.
    pub fn is_cert_service_request(&self) -> bool {
        self.cert_client_id().is_some() && self.cert_issuer() == Some(EXTERNAL_ISSUER)
    }

    /// Classify how a programmatic caller authenticated: an OAuth2 client id
    /// claim, a client certificate, or a redeemed one-time token, in that
    /// order of precedence.
    pub fn classify_auth_flow(&self) -> Result<Option<AuthDetails>, MappingError> {
        match self.get_string(CLIENT_ID_KEY) {
            Ok(client_id) => return Ok(Some(AuthDetails::new(client_id, AuthFlow::OAuth2))),
            Err(e) if !e.is_key_does_not_exist() => return Err(e),
            Err(_) => {}
        }

        if let Some(client_id) = self.cert_client_id() {
            let mut details = AuthDetails::new(client_id, AuthFlow::Certificate);
            details.cert_issuer = self.cert_issuer().map(str::to_string);
            return Ok(Some(details));
        }

        if let Some(client_id) = self.header_value(CLIENT_ID_TOKEN_HEADER) {
            return Ok(Some(AuthDetails::new(client_id, AuthFlow::OneTimeToken)));
        }

        Ok(None)
    }
}

fn cast_error(target: &str) -> MappingError {
    MappingError::internal(format!("unable to cast the value to a {} type", target))
}

/// Fold a resolved context into the request body, leaving every other
/// `extra` entry untouched.
pub fn fold_object_context(mut body: RequestBody, ctx: &ObjectContext) -> RequestBody {
    let tenant = serde_json::json!({
        CONSUMER_TENANT_KEY: ctx.tenant.tenant_id.as_str(),
        EXTERNAL_TENANT_OUT_KEY: ctx.tenant.external_tenant_id.as_str(),
    });

    body.extra
        .insert(EXTERNAL_TENANT_KEY.to_string(), Value::String(tenant.to_string()));
    body.extra
        .insert(SCOPES_KEY.to_string(), Value::String(ctx.scopes.clone()));
    body.extra
        .insert(OBJECT_ID_KEY.to_string(), Value::String(ctx.consumer_id.clone()));
    body.extra.insert(
        OBJECT_TYPE_KEY.to_string(),
        Value::String(ctx.consumer_type.to_string()),
    );
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProviderKind, TenantContext};
    use http::{HeaderName, HeaderValue};
    use serde_json::json;

    fn set_header(map: &mut HeaderMap, name: &str, value: &str) {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }

    fn request(extra: Value) -> RequestData {
        let body = RequestBody {
            extra: extra.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        };
        RequestData::new(body, HeaderMap::new())
    }

    #[test]
    fn test_body_accepts_null_sections() {
        let data = RequestData::from_slice(
            br#"{"subject":"s","extra":null,"header":null}"#,
            HeaderMap::new(),
        )
        .unwrap();
        assert_eq!(data.body.subject, "s");
        assert!(data.body.extra.is_empty());
        assert!(data.body.header.is_empty());
    }

    #[test]
    fn test_malformed_body_is_invalid_data() {
        let err = RequestData::from_slice(b"{not json", HeaderMap::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidData);
    }

    #[test]
    fn test_get_string_missing_and_wrong_type() {
        let data = request(json!({"name": "alice", "client_id": 42}));
        assert_eq!(data.get_string("name").unwrap(), "alice");
        assert!(data.get_string("tenant").unwrap_err().is_key_does_not_exist());

        let err = data.get_string("client_id").unwrap_err();
        assert!(!err.is_key_does_not_exist());
        assert!(err.to_string().contains("unable to cast the value to a string type"));
    }

    #[test]
    fn test_header_lookup_prefers_forwarded_headers() {
        let mut body = RequestBody::default();
        body.header.insert(
            "client-id-from-certificate".to_string(),
            vec!["from-body".to_string()],
        );
        let mut header = HeaderMap::new();
        set_header(&mut header, CLIENT_ID_CERT_HEADER, "from-request");
        set_header(&mut header, CLIENT_CERT_ISSUER_HEADER, EXTERNAL_ISSUER);

        let data = RequestData::new(body, header);
        assert_eq!(data.cert_client_id(), Some("from-body"));
        assert_eq!(data.cert_issuer(), Some(EXTERNAL_ISSUER));
        assert!(data.is_cert_service_request());
    }

    #[test]
    fn test_external_tenant_falls_back_to_header() {
        let mut data = request(json!({}));
        assert!(data.get_external_tenant_id().unwrap_err().is_key_does_not_exist());

        data.header.insert("tenant", HeaderValue::from_static("ext-9"));
        assert_eq!(data.get_external_tenant_id().unwrap(), "ext-9");

        let data = request(json!({"tenant": "ext-1"}));
        assert_eq!(data.get_external_tenant_id().unwrap(), "ext-1");
    }

    #[test]
    fn test_scopes_string_or_list() {
        assert_eq!(request(json!({"scope": "a b"})).get_scopes().unwrap(), "a b");
        assert_eq!(
            request(json!({"scope": ["a", "b"]})).get_scopes().unwrap(),
            "a b"
        );
        assert!(request(json!({"scope": ["a", 1]})).get_scopes().is_err());
        assert!(request(json!({})).get_scopes().unwrap_err().is_key_does_not_exist());
    }

    #[test]
    fn test_groups_and_access_levels_skip_non_strings() {
        let data = request(json!({
            "groups": ["g1", 2, "g2", ""],
            "tenant_access_levels": ["account", null],
        }));
        assert_eq!(data.get_user_groups(), vec!["g1", "g2"]);
        assert_eq!(data.get_access_levels(), vec!["account"]);
        assert!(request(json!({"groups": "g1"})).get_user_groups().is_empty());
    }

    #[test]
    fn test_consumer_type_claim() {
        let data = request(json!({}));
        assert_eq!(
            data.get_consumer_type(ConsumerType::IntegrationSystem).unwrap(),
            ConsumerType::IntegrationSystem
        );
        let data = request(json!({"consumer_type": "Runtime"}));
        assert_eq!(
            data.get_consumer_type(ConsumerType::IntegrationSystem).unwrap(),
            ConsumerType::Runtime
        );
        let data = request(json!({"consumer_type": "Robot"}));
        assert!(data.get_consumer_type(ConsumerType::Runtime).is_err());
    }

    #[test]
    fn test_classify_auth_flow_precedence() {
        let mut data = request(json!({"client_id": "sa-1"}));
        set_header(&mut data.header, CLIENT_ID_CERT_HEADER, "cert-1");
        let details = data.classify_auth_flow().unwrap().unwrap();
        assert_eq!(details.auth_flow, AuthFlow::OAuth2);
        assert_eq!(details.auth_id, "sa-1");

        let mut data = request(json!({}));
        set_header(&mut data.header, CLIENT_ID_CERT_HEADER, "cert-1");
        set_header(&mut data.header, CLIENT_ID_TOKEN_HEADER, "ott-1");
        let details = data.classify_auth_flow().unwrap().unwrap();
        assert_eq!(details.auth_flow, AuthFlow::Certificate);

        let mut data = request(json!({}));
        set_header(&mut data.header, CLIENT_ID_TOKEN_HEADER, "ott-1");
        let details = data.classify_auth_flow().unwrap().unwrap();
        assert_eq!(details.auth_flow, AuthFlow::OneTimeToken);

        assert!(request(json!({})).classify_auth_flow().unwrap().is_none());
        assert!(request(json!({"client_id": 1})).classify_auth_flow().is_err());
    }

    #[test]
    fn test_fold_object_context_keeps_other_entries() {
        let data = request(json!({"name": "alice", "scope": "old"}));
        let ctx = ObjectContext {
            tenant: TenantContext::new("ext-1", "int-1"),
            scopes: "x:read".to_string(),
            consumer_id: "alice".to_string(),
            consumer_type: ConsumerType::StaticUser,
            auth_flow: AuthFlow::Jwt,
            region: None,
            provider: ProviderKind::StaticUser,
            oauth_client_id: None,
        };

        let body = fold_object_context(data.body, &ctx);
        assert_eq!(body.extra["name"], json!("alice"));
        assert_eq!(body.extra["scope"], json!("x:read"));
        assert_eq!(body.extra["objectID"], json!("alice"));
        assert_eq!(body.extra["objectType"], json!("Static User"));

        let tenant: Value =
            serde_json::from_str(body.extra["tenant"].as_str().unwrap()).unwrap();
        assert_eq!(
            tenant,
            json!({"consumerTenant": "int-1", "externalTenant": "ext-1"})
        );
    }
}
