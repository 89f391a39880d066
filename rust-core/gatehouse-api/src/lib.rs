// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Gatehouse API
//!
//! HTTP surface over the CRUD engine. Every registered model is served under
//! its collection name:
//!
//! - `GET /{collection}` lists (query-string pairs become equality filters)
//! - `POST /{collection}` creates
//! - `GET | PATCH | DELETE /{collection}/{<id_param>}`, the path parameter
//!   named after the model's `id_param`
//! - `GET /permissions` lists the caller's held tokens
//! - `GET /health`, `GET /metrics`
//!
//! Successful responses are `{"statusCode": n, "data": [...]}`, failures
//! `{"statusCode": n, "error": "..."}`.

pub mod auth;
pub mod config;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use gatehouse_audit::{AuditError, AuditRecorder};
use gatehouse_authz::{Principal, ADMIN, ROLES_FIELD};
use gatehouse_engine::{
    builtin, Engine, EngineError, ModelError, ModelRegistry, ModelRegistryBuilder,
    Projection, Services,
};
use gatehouse_storage::{DocumentStore, Filter, InMemoryBackend, KvDocumentStore, ID_FIELD};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

pub use auth::{ApiKeyAuthenticator, AuthFailure, Authenticator};
pub use config::ApiConfig;

/// API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Auth(#[from] AuthFailure),

    #[error("Invalid request body: {0}")]
    Body(#[from] JsonRejection),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            status_code: status.as_u16(),
            error: message,
        });
        (status, body).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub error: String,
}

/// Success response body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub status_code: u16,
    pub data: Vec<T>,
}

impl<T> Envelope<T> {
    fn ok(data: Vec<T>) -> Json<Self> {
        Json(Self {
            status_code: StatusCode::OK.as_u16(),
            data,
        })
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Errors that stop the server from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid model registry: {0}")]
    Model(#[from] ModelError),

    #[error("Audit setup failed: {0}")]
    Audit(#[from] AuditError),

    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub authenticator: Arc<dyn Authenticator>,
    pub metrics: Registry,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: Engine, authenticator: Arc<dyn Authenticator>, metrics: Registry) -> Self {
        Self {
            engine: Arc::new(engine),
            authenticator,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Authenticate the request and load the principal with its roles.
    async fn principal(&self, headers: &HeaderMap) -> Result<Option<Principal>, ApiError> {
        let Some(id) = self.authenticator.authenticate(headers).await? else {
            return Ok(None);
        };
        match self.engine.load_principal(&id).await? {
            Some(principal) => Ok(Some(principal)),
            None => {
                warn!(principal = %id, "Credentials map to a missing principal");
                Err(AuthFailure::UnknownPrincipal(id).into())
            }
        }
    }
}

/// Engine over an in-memory store with the built-in models plus whatever
/// `extend` registers. Audit counters are registered with `metrics`.
pub fn build_engine<F>(metrics: &Registry, extend: F) -> Result<Engine, StartupError>
where
    F: FnOnce(ModelRegistryBuilder) -> ModelRegistryBuilder,
{
    let models = extend(builtin::register(ModelRegistry::builder())).build()?;
    let store: Arc<dyn DocumentStore> = Arc::new(KvDocumentStore::new(InMemoryBackend::new()));
    let audit = AuditRecorder::new(Arc::clone(&store)).with_prometheus(metrics)?;
    let services = Services::new(store).with_audit(audit);
    Ok(Engine::new(Arc::new(models), services))
}

/// Give `principal_id` a global `admin` role unless a principal with that id
/// is already stored.
#[instrument(skip(engine))]
pub async fn seed_admin(engine: &Engine, principal_id: &str) -> Result<(), EngineError> {
    let services = engine.services();
    let principals = services.roles.principals_collection();
    if services.store.find_one(principals, principal_id).await?.is_some() {
        info!(principal = %principal_id, "Bootstrap principal already present");
        return Ok(());
    }

    let role = services.roles.create("admin", None, [ADMIN]).await?;
    let mut fields = Map::new();
    fields.insert(ID_FIELD.to_string(), Value::from(principal_id));
    fields.insert(ROLES_FIELD.to_string(), Value::from(vec![role.id.clone()]));
    services.store.insert(principals, fields).await?;
    info!(principal = %principal_id, role = %role.id, "Bootstrap admin created");
    Ok(())
}

/// Paths served by the router itself; a model cannot claim them.
const RESERVED_PATHS: [&str; 3] = ["health", "metrics", "permissions"];

/// Collection served by one pair of model routes.
#[derive(Debug, Clone)]
struct ModelRoute {
    collection: String,
}

/// Build the API router
///
/// Each registered model gets `/{collection}` and
/// `/{collection}/{<id_param>}`. Anything else is answered with a 404
/// envelope.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/permissions", get(permissions_handler));

    for model in state.engine.models().iter() {
        if RESERVED_PATHS.contains(&model.collection.as_str()) {
            error!(collection = %model.collection, "Collection shadows a built-in route; not served");
            continue;
        }
        if !is_path_segment(&model.collection) || !is_path_segment(&model.id_param) {
            error!(
                collection = %model.collection,
                id_param = %model.id_param,
                "Collection or id parameter is not a plain path segment; not served"
            );
            continue;
        }
        let route = ModelRoute {
            collection: model.collection.clone(),
        };
        router = router
            .route(
                &format!("/{}", model.collection),
                get(list_handler)
                    .post(create_handler)
                    .layer(Extension(route.clone())),
            )
            .route(
                &format!("/{}/{{{}}}", model.collection, model.id_param),
                get(read_handler)
                    .patch(update_handler)
                    .delete(delete_handler)
                    .layer(Extension(route)),
            );
    }

    router.fallback(not_found_handler).with_state(state)
}

fn is_path_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '{', '}', '*', ':'])
}

async fn not_found_handler(uri: Uri) -> ApiError {
    EngineError::UnknownModel(uri.path().to_string()).into()
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let encoder = TextEncoder::new();
    let body = encoder.encode_to_string(&state.metrics.gather())?;
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], body).into_response())
}

#[instrument(skip(state, headers))]
async fn permissions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Envelope<String>>, ApiError> {
    let principal = state.principal(&headers).await?;
    let held = state.engine.permissions(principal.as_ref()).await?;
    Ok(Envelope::ok(held))
}

#[instrument(skip_all, fields(collection = %route.collection))]
async fn list_handler(
    State(state): State<AppState>,
    Extension(route): Extension<ModelRoute>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Envelope<Projection>>, ApiError> {
    let principal = state.principal(&headers).await?;
    // Query values compare as JSON strings.
    let filter = params
        .into_iter()
        .fold(Filter::all(), |filter, (field, value)| filter.eq(field, value));
    let data = state
        .engine
        .controller_for_collection(&route.collection)?
        .list(principal.as_ref(), &filter)
        .await?;
    Ok(Envelope::ok(data))
}

#[instrument(skip_all, fields(collection = %route.collection))]
async fn create_handler(
    State(state): State<AppState>,
    Extension(route): Extension<ModelRoute>,
    headers: HeaderMap,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Projection>>), ApiError> {
    let principal = state.principal(&headers).await?;
    let Json(body) = body?;
    let created = state
        .engine
        .controller_for_collection(&route.collection)?
        .create(principal.as_ref(), &body)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope {
            status_code: StatusCode::CREATED.as_u16(),
            data: vec![created],
        }),
    ))
}

#[instrument(skip_all, fields(collection = %route.collection, id = %id))]
async fn read_handler(
    State(state): State<AppState>,
    Extension(route): Extension<ModelRoute>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Envelope<Projection>>, ApiError> {
    let principal = state.principal(&headers).await?;
    let document = state
        .engine
        .controller_for_collection(&route.collection)?
        .read(principal.as_ref(), &id)
        .await?;
    Ok(Envelope::ok(vec![document]))
}

#[instrument(skip_all, fields(collection = %route.collection, id = %id))]
async fn update_handler(
    State(state): State<AppState>,
    Extension(route): Extension<ModelRoute>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<Envelope<Projection>>, ApiError> {
    let principal = state.principal(&headers).await?;
    let Json(body) = body?;
    let updated = state
        .engine
        .controller_for_collection(&route.collection)?
        .update(principal.as_ref(), &id, &body)
        .await?;
    Ok(Envelope::ok(vec![updated]))
}

#[instrument(skip_all, fields(collection = %route.collection, id = %id))]
async fn delete_handler(
    State(state): State<AppState>,
    Extension(route): Extension<ModelRoute>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Envelope<Projection>>, ApiError> {
    let principal = state.principal(&headers).await?;
    let removed = state
        .engine
        .controller_for_collection(&route.collection)?
        .delete(principal.as_ref(), &id)
        .await?;
    Ok(Envelope::ok(vec![removed]))
}

/// Start the API server
pub async fn serve(config: ApiConfig) -> Result<(), StartupError> {
    let metrics = Registry::new();
    let engine = build_engine(&metrics, |models| models)?;
    if let Some(admin) = &config.bootstrap_admin {
        seed_admin(&engine, admin).await?;
    }

    let authenticator = ApiKeyAuthenticator::from_keys(&config.api_keys);
    if authenticator.is_empty() {
        warn!("No API keys configured; every request is anonymous");
    }
    let app = build_router(AppState::new(engine, Arc::new(authenticator), metrics));

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting Gatehouse API server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
