use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, FromRequest, FromRequestParts, Path, Request},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use crate::{
    admin_token::AdminGate,
    config::Config,
    domain::{DomainError, ServerConfig},
    geo::LocationResolver,
    key_status::{KeyStatus, key_status},
    probe::Pinger,
    server_status::{GlobalStatus, ServerOverride, ServerStatusError, ServerStatusHandle},
    state::{JsonSnapshotStore, StoreError},
};


#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<JsonSnapshotStore>>,
    pub server_status: Arc<ServerStatusHandle<JsonSnapshotStore>>,
    pub admin_gate: AdminGate,
}

#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    message: String,
    status: StatusCode,
    details: Map<String, Value>,
}

impl ApiError {
    fn new(code: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status,
            details: Map::new(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("invalid_request", StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", StatusCode::UNAUTHORIZED, message)
    }

    pub fn no_active_servers(message: impl Into<String>) -> Self {
        Self::new(
            "no_active_servers",
            StatusCode::SERVICE_UNAVAILABLE,
            message,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal", StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::MissingUser { .. } => ApiError::not_found(value.to_string()),
            DomainError::InvalidKeyType { .. } | DomainError::MissingServerIp => {
                ApiError::invalid_request(value.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(domain) => domain.into(),
            StoreError::SchemaVersionMismatch { .. }
            | StoreError::Io { .. }
            | StoreError::SerdeJson(_) => ApiError::internal(value.to_string()),
        }
    }
}

impl From<ServerStatusError> for ApiError {
    fn from(value: ServerStatusError) -> Self {
        match value {
            ServerStatusError::NoActiveServers => ApiError::no_active_servers(value.to_string()),
            ServerStatusError::Domain(domain) => domain.into(),
            ServerStatusError::Store(store) => store.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    details: Map<String, Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    axum::Json<T>: FromRequest<S>,
    <axum::Json<T> as FromRequest<S>>::Rejection: std::fmt::Display,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::invalid_request(e.to_string()))?;
        Ok(Self(value))
    }
}

/// Extractor that admits only requests carrying the admin bearer token.
pub struct RequireAdmin;

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(app) = parts.extensions.get::<AppState>() else {
            return Err(ApiError::internal("app state missing"));
        };
        let token = extract_bearer_token(&parts.headers);
        if app.admin_gate.is_admin(token.as_deref()) {
            return Ok(Self);
        }
        Err(ApiError::unauthorized(
            "missing or invalid authorization token",
        ))
    }
}

/// The auth scheme is matched case-insensitively; blank tokens count as absent.
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

#[derive(Debug, Deserialize)]
struct UpdateServerConfigRequest {
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

pub fn build_router(
    config: Config,
    store: Arc<Mutex<JsonSnapshotStore>>,
    pinger: Arc<dyn Pinger>,
    resolver: Arc<LocationResolver>,
) -> Router {
    let server_status = Arc::new(ServerStatusHandle::new(
        store.clone(),
        pinger,
        resolver,
        config.probe_options(),
    ));
    let app_state = AppState {
        admin_gate: AdminGate::new(config.admin_token_hash()),
        store,
        server_status,
    };

    let api = Router::new()
        .route("/health", get(health))
        .route("/vpn-server/status", get(get_server_status))
        .route(
            "/vpn-server/config",
            get(get_server_config).put(put_server_config),
        )
        .route(
            "/vpn-key/status/:key_type/:user_id",
            get(get_key_status),
        )
        .fallback(fallback_not_found);

    Router::new()
        .nest("/api", api)
        .layer(Extension(app_state))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::version::VERSION,
    }))
}

async fn get_server_status(
    Extension(state): Extension<AppState>,
) -> Result<Json<GlobalStatus>, ApiError> {
    Ok(Json(state.server_status.refresh().await?))
}

async fn get_server_config(Extension(state): Extension<AppState>) -> Json<ServerConfig> {
    Json(state.server_status.current().await)
}

async fn put_server_config(
    _admin: RequireAdmin,
    Extension(state): Extension<AppState>,
    ApiJson(req): ApiJson<UpdateServerConfigRequest>,
) -> Result<Json<ServerOverride>, ApiError> {
    let out = state
        .server_status
        .set_manual(req.ip.as_deref(), req.location.as_deref())
        .await?;
    Ok(Json(out))
}

async fn get_key_status(
    Extension(state): Extension<AppState>,
    Path((key_type, user_id)): Path<(String, String)>,
) -> Result<Json<KeyStatus>, ApiError> {
    let handle = &state.server_status;
    let status = key_status(
        &*state.store,
        handle.pinger(),
        handle.resolver(),
        &key_type,
        &user_id,
        handle.probe_options(),
    )
    .await?;
    Ok(Json(status))
}

async fn fallback_not_found() -> ApiError {
    ApiError::not_found("api endpoint not found")
}
