// HTTP endpoints called by the API gateway

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::authenticator::{Authenticators, Coordinates};
use crate::dispatcher::Dispatcher;
use crate::jwks::{JwksError, TokenVerifier, UnverifiedToken};
use crate::request::keys::{AUTHENTICATOR_COORDINATES_KEY, TENANT_HEADER};
use crate::request::{RequestBody, RequestData};
use crate::runtime_mapping::{RuntimeMapper, RuntimeMappingError};
use crate::scopes::FileScopesGetter;
use crate::statics::{StaticGroupRepository, StaticUserRepository};

const AUTHORIZATION: &str = "Authorization";
const ERROR_KEY: &str = "error";

/// Tables that `/admin/reload` re-reads from disk.
pub struct Reloadables {
    pub scopes: Arc<FileScopesGetter>,
    pub static_users: Arc<StaticUserRepository>,
    pub static_groups: Arc<StaticGroupRepository>,
}

impl Reloadables {
    /// Parse every file before storing any, so that a failure leaves all
    /// tables at their previous versions.
    pub fn reload_all(&self) -> anyhow::Result<()> {
        let scopes = self.scopes.read()?;
        let users = self.static_users.read()?;
        let groups = self.static_groups.read()?;

        if let Some(document) = scopes {
            self.scopes.store(document);
        }
        if let Some(records) = users {
            self.static_users.store(records);
        }
        if let Some(records) = groups {
            self.static_groups.store(records);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub authenticators: Authenticators,
    /// Verifies tokens presented to the authenticator mapping endpoint.
    pub authn_verifier: Arc<TokenVerifier>,
    pub runtime_mapper: Arc<RuntimeMapper>,
    pub reloadables: Arc<Reloadables>,
}

pub fn create_router(state: AppState, admin_verifier: Option<Arc<TokenVerifier>>) -> Router {
    let mut admin = Router::new().route("/admin/reload", post(reload_tables));
    match admin_verifier {
        Some(verifier) => {
            admin = admin.layer(from_fn_with_state(verifier, admin_auth_middleware));
        }
        None => warn!("Admin endpoints are not protected: no admin JWKS configured"),
    }

    Router::new()
        .route("/health", get(health_check))
        .route("/tenant-mappings", post(tenant_mappings))
        .route("/authn-mappings/{authenticator}", post(authn_mappings))
        .route("/runtime-mappings", post(runtime_mappings))
        .merge(admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// The gateway expects the request body back on every outcome; failures are
/// only visible in the logs and as missing `extra` keys.
async fn tenant_mappings(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let data = match RequestData::from_slice(&body, headers) {
        Ok(data) => data,
        Err(e) => {
            error!("An error occurred while parsing request: {}", e);
            return ([(header::CONTENT_TYPE, "application/json")], body).into_response();
        }
    };

    let original = data.body.clone();
    match state.dispatcher.hydrate(data).await {
        Ok(hydrated) => Json(hydrated).into_response(),
        Err(e) => {
            error!("An error occurred while getting object context: {}", e);
            Json(original).into_response()
        }
    }
}

#[derive(Debug, Error)]
enum AuthnMappingError {
    #[error("authenticator {0} is not configured")]
    UnknownAuthenticator(String),

    #[error("unexpected or empty authorization header")]
    MissingBearer,

    #[error(transparent)]
    Token(#[from] JwksError),

    #[error("issuer {issuer} is not trusted by authenticator {authenticator}")]
    UntrustedIssuer { issuer: String, authenticator: String },

    #[error("token does not carry the unique attribute of authenticator {0}")]
    UniqueAttributeMismatch(String),
}

async fn authn_mappings(
    State(state): State<AppState>,
    Path(authenticator): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut data = match RequestData::from_slice(&body, headers) {
        Ok(data) => data,
        Err(e) => {
            error!("An error has occurred while parsing the request: {}", e);
            return (StatusCode::OK, "Unable to parse request data").into_response();
        }
    };

    info!("Matched authenticator is {}", authenticator);

    match verify_authenticator_token(&state, &authenticator, &data).await {
        Ok((claims, coordinates)) => {
            data.body.extra.extend(claims);
            data.body.extra.insert(
                AUTHENTICATOR_COORDINATES_KEY.to_string(),
                json!({"name": coordinates.name, "index": coordinates.index}),
            );
        }
        Err(e) => {
            error!("An error has occurred while processing the request: {}", e);
            data.body.extra.insert(
                ERROR_KEY.to_string(),
                json!({"message": "Token validation failed"}),
            );
        }
    }

    Json(data.body).into_response()
}

async fn verify_authenticator_token(
    state: &AppState,
    name: &str,
    data: &RequestData,
) -> Result<(Map<String, Value>, Coordinates), AuthnMappingError> {
    let authn = state
        .authenticators
        .by_name(name)
        .ok_or_else(|| AuthnMappingError::UnknownAuthenticator(name.to_string()))?;

    let token = data
        .header_value(AUTHORIZATION)
        .and_then(bearer_token)
        .ok_or(AuthnMappingError::MissingBearer)?;

    // The issuer decides where keys are fetched from, so it must be trusted
    // before the signature is checked.
    let unverified = UnverifiedToken::parse(token)?;
    let issuer = unverified.issuer()?;
    let index = authn
        .issuer_index(issuer)
        .ok_or_else(|| AuthnMappingError::UntrustedIssuer {
            issuer: issuer.to_string(),
            authenticator: authn.name.clone(),
        })?;

    let claims = state.authn_verifier.verify(token).await?;

    let claimed = RequestData::new(
        RequestBody {
            extra: claims.clone(),
            ..Default::default()
        },
        HeaderMap::new(),
    );
    if !authn.matches_unique_attribute(&claimed) {
        return Err(AuthnMappingError::UniqueAttributeMismatch(authn.name.clone()));
    }

    Ok((
        claims,
        Coordinates {
            name: authn.name.clone(),
            index,
        },
    ))
}

/// Token of a `Bearer` authorization value; the scheme is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Maps a runtime token to the external id of the runtime's owner tenant,
/// exposed to the gateway through the `Tenant` header.
async fn runtime_mappings(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let mut data = match RequestData::from_slice(&body, headers) {
        Ok(data) => data,
        Err(e) => {
            error!("An error has occurred while parsing the request: {}", e);
            return ([(header::CONTENT_TYPE, "application/json")], body).into_response();
        }
    };

    let mapped = match data.header_value(AUTHORIZATION).and_then(bearer_token) {
        Some(token) => state.runtime_mapper.map(token).await,
        None => Err(RuntimeMappingError::MissingBearer),
    };

    match mapped {
        Ok(mapping) => {
            info!(
                "Mapped runtime {} to tenant {}",
                mapping.runtime_id, mapping.external_tenant
            );
            data.body.extra.extend(mapping.claims);
            data.body.header.insert(
                TENANT_HEADER.to_string(),
                vec![mapping.external_tenant.to_string()],
            );
        }
        Err(e) => error!("An error has occurred while processing the request: {}", e),
    }

    Json(data.body).into_response()
}

fn unauthorized(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"title": "Unauthorized", "detail": detail})),
    )
        .into_response()
}

/// Requires a bearer token signed by a key of the admin JWK set.
pub async fn admin_auth_middleware(
    State(verifier): State<Arc<TokenVerifier>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(token) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
    else {
        return unauthorized("Missing or invalid Authorization header");
    };

    match verifier.verify(&token).await {
        Ok(_) => next.run(req).await,
        Err(e) => {
            warn!("Rejected admin request: {}", e);
            unauthorized("Authentication failed")
        }
    }
}

async fn reload_tables(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let reloadables = &state.reloadables;
    reloadables.reload_all().map_err(|e| {
        error!("Reload failed, previous tables stay live: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({
        "status": "ok",
        "staticUsers": reloadables.static_users.len(),
        "staticGroups": reloadables.static_groups.len(),
    })))
}
