//! Well-known claim keys and header names.

/// Header carrying the client id extracted from an mTLS certificate.
pub const CLIENT_ID_CERT_HEADER: &str = "Client-Id-From-Certificate";
/// Header naming the component that validated the client certificate.
pub const CLIENT_CERT_ISSUER_HEADER: &str = "Client-Certificate-Issuer";
/// Header carrying the client id of a redeemed one-time token.
pub const CLIENT_ID_TOKEN_HEADER: &str = "Client-Id-From-Token";
/// Request header naming the tenant a certificate caller acts on.
pub const TENANT_HEADER: &str = "Tenant";

/// Issuer marker of certificates minted by the external certificate service.
pub const EXTERNAL_ISSUER: &str = "certificate-service";

pub const CLIENT_ID_KEY: &str = "client_id";
pub const USERNAME_KEY: &str = "name";
pub const SCOPES_KEY: &str = "scope";
pub const EXTERNAL_TENANT_KEY: &str = "tenant";
pub const USER_GROUPS_KEY: &str = "groups";
pub const AUTHENTICATOR_COORDINATES_KEY: &str = "authenticator_coordinates";
pub const CONSUMER_TYPE_KEY: &str = "consumer_type";
pub const ACCESS_LEVELS_KEY: &str = "tenant_access_levels";

/// Access level allowing a certificate to act without a tenant.
pub const GLOBAL_ACCESS_LEVEL: &str = "global";

// Keys written back into `extra` on the response.
pub const OBJECT_ID_KEY: &str = "objectID";
pub const OBJECT_TYPE_KEY: &str = "objectType";
pub const CONSUMER_TENANT_KEY: &str = "consumerTenant";
pub const EXTERNAL_TENANT_OUT_KEY: &str = "externalTenant";
