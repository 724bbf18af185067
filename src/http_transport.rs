//! Admin HTTP endpoints
//!
//! All routes live under the configured prefix:
//!
//! | method | path                | result                                   |
//! |--------|---------------------|------------------------------------------|
//! | GET    | `/devices`          | `[{id, name, displayName}]`              |
//! | GET    | `/entities`         | `[{entity_id, name, displayName}]`       |
//! | GET    | `/filters`          | areas, labels, domain counts             |
//! | GET    | `/entity_info`      | live state and detected modes            |
//! | POST   | `/discover`         | `{ok: true}`                             |
//! | POST   | `/inject/:id`       | `{forwarded, errors, done}`              |
//!
//! Errors are plain text with the machine-readable kind in the
//! `x-error-kind` header.

use crate::config::HttpConfig;
use crate::error::{BridgeError, ErrorKind, ErrorReporter, Result};
use crate::flow::{FlowMessage, InputOutcome, NodeRegistry};
use crate::registry::{
    DeviceFilter, DeviceSummary, EntityInfo, EntitySummary, FilterOptions, RegistryService,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Header carrying the [`ErrorKind`] of a failed request
pub const ERROR_KIND_HEADER: &str = "x-error-kind";

/// Shared state of the admin endpoints
pub struct AppState {
    pub registry: RegistryService,
    pub nodes: NodeRegistry,
}

/// Error response: human-readable text plus the error kind header
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    fn new(error: BridgeError, operation: &str) -> Self {
        ErrorReporter::log_error(&error, "http", operation);
        let kind = error.kind();
        Self {
            status: StatusCode::from_u16(kind.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            kind,
            message: error.message(),
        }
    }

    /// Report an unknown node as 404 instead of 400
    fn unknown_node_as_404(mut self) -> Self {
        if self.kind == ErrorKind::NotFound {
            self.status = StatusCode::NOT_FOUND;
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (HeaderName::from_static(ERROR_KIND_HEADER), self.kind.as_str()),
            ],
            self.message,
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct DevicesQuery {
    pub server: Option<String>,
    pub area: Option<String>,
    pub label: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntitiesQuery {
    pub server: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerQuery {
    pub server: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntityInfoQuery {
    pub server: Option<String>,
    pub entity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
    nodes: usize,
    managed: bool,
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        nodes: state.nodes.len(),
        managed: state.registry.resolver().managed().is_managed(),
    })
}

async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DevicesQuery>,
) -> ApiResult<Vec<DeviceSummary>> {
    let filter = DeviceFilter::new(
        query.area.as_deref(),
        query.label.as_deref(),
        query.domain.as_deref(),
    );
    state
        .registry
        .list_devices(query.server.as_deref(), &filter)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, "list_devices"))
}

async fn list_entities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntitiesQuery>,
) -> ApiResult<Vec<EntitySummary>> {
    state
        .registry
        .list_entities(query.server.as_deref(), query.device.as_deref())
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, "list_entities"))
}

async fn list_filters(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ServerQuery>,
) -> ApiResult<FilterOptions> {
    state
        .registry
        .list_filters(query.server.as_deref())
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, "list_filters"))
}

async fn entity_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntityInfoQuery>,
) -> ApiResult<EntityInfo> {
    let entity = query.entity.unwrap_or_default();
    state
        .registry
        .get_entity_info(query.server.as_deref(), &entity)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, "entity_info"))
}

async fn discover(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DiscoverRequest>,
) -> ApiResult<DiscoverResponse> {
    let id = request
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::new(BridgeError::invalid_input("Missing id"), "discover"))?;

    state
        .nodes
        .discover(&id)
        .await
        .map(|()| Json(DiscoverResponse { ok: true }))
        .map_err(|e| ApiError::new(e, "discover").unknown_node_as_404())
}

async fn inject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(msg): Json<FlowMessage>,
) -> ApiResult<InputOutcome> {
    state
        .nodes
        .inject(&id, msg)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, "inject").unknown_node_as_404())
}

/// Routes relative to the admin prefix
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/entities", get(list_entities))
        .route("/filters", get(list_filters))
        .route("/entity_info", get(entity_info))
        .route("/discover", post(discover))
        .route("/inject/:id", post(inject))
}

/// Build the admin router with `prefix` (e.g. `/echo-ha`) in front of every
/// admin route
pub fn router(state: Arc<AppState>, prefix: &str) -> Router {
    let prefix = prefix.trim_end_matches('/');
    let app = Router::new().route("/health", get(health_check));

    let app = if prefix.is_empty() {
        app.merge(admin_routes())
    } else {
        app.nest(prefix, admin_routes())
    };

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve the admin router until `shutdown` is cancelled
pub async fn serve(
    config: &HttpConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(state, &config.admin_prefix);
    let address = format!("{}:{}", config.host, config.port);

    let listener = TcpListener::bind(&address).await.map_err(|e| {
        BridgeError::connection(format!("Failed to bind to {address}: {e}"))
    })?;

    info!(address = %address, prefix = %config.admin_prefix, "Admin HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| BridgeError::connection(format!("HTTP server error: {e}")))?;

    info!("Admin HTTP server stopped");
    Ok(())
}
