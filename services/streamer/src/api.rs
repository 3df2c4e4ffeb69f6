use crate::config::ApiConfig;
use crate::preprocess::{PreprocessNotifier, PreprocessRequest};
use crate::profile::{ApiResponse, ProfileRecord, StreamerIdRequest};
use crate::profile_store::{ProfileStore, StoreError, UpsertOutcome};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProfileStore>,
    pub notifier: Arc<dyn PreprocessNotifier>,
    /// User id sent with preprocessing requests
    pub preprocess_user_id: String,
    /// Local directory holding streamer base videos
    pub video_dir: PathBuf,
}

type ApiError = (StatusCode, Json<ApiResponse<serde_json::Value>>);

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/streamer/list", post(list_streamers))
        .route("/streamer/info", post(get_streamer_info))
        .route("/streamer/edit", post(edit_streamer_info))
        .route("/streamer/delete", post(delete_streamer))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .with_state(state)
}

/// CORS for the browser front-end; an empty origin list allows any origin
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if !config.cors_enabled {
        return CorsLayer::new();
    }

    let allow_origin = if config.cors_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .cors_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "streamer-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "store": "readable"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "store": "unreadable",
                "error": e.to_string()
            })),
        ),
    }
}

/// All streamer profiles, used by the front-end streamer picker
#[instrument(skip(state))]
async fn list_streamers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProfileRecord>>>, ApiError> {
    let records = state
        .store
        .list_all()
        .await
        .map_err(|e| store_failure("Failed to list streamer profiles", e))?;

    info!(count = records.len(), "Listed streamer profiles");

    Ok(Json(ApiResponse::success(records)))
}

/// One streamer profile, or the placeholder when none matches
#[instrument(skip(state))]
async fn get_streamer_info(
    State(state): State<AppState>,
    Json(request): Json<StreamerIdRequest>,
) -> Result<Json<ApiResponse<Vec<ProfileRecord>>>, ApiError> {
    let mut picked = match request.stored_id() {
        Some(id) => state
            .store
            .get_by_id(id)
            .await
            .map_err(|e| store_failure("Failed to read streamer profile", e))?,
        None => Vec::new(),
    };

    if picked.is_empty() {
        // Unknown id or nothing selected yet
        picked.push(ProfileRecord::placeholder());
    }

    Ok(Json(ApiResponse::success(picked)))
}

/// Create or replace a streamer profile
#[instrument(skip(state, record), fields(streamer_id = record.id, name = %record.name))]
async fn edit_streamer_info(
    State(state): State<AppState>,
    Json(record): Json<ProfileRecord>,
) -> Result<Json<ApiResponse<u64>>, ApiError> {
    let outcome = state
        .store
        .upsert(record)
        .await
        .map_err(|e| store_failure("Failed to save streamer profile", e))?;

    if outcome.needs_preprocess {
        request_preprocess(&state, &outcome).await;
    }

    Ok(Json(ApiResponse::success(outcome.id)))
}

/// Remove a streamer profile
#[instrument(skip(state))]
async fn delete_streamer(
    State(state): State<AppState>,
    Json(request): Json<StreamerIdRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let removed = match request.stored_id() {
        Some(id) => state
            .store
            .delete_by_id(id)
            .await
            .map_err(|e| store_failure("Failed to delete streamer profile", e))?,
        None => false,
    };

    if !removed {
        warn!(streamer_id = request.streamer_id, "Delete requested for unknown streamer");
        return Ok(Json(ApiResponse::fail("")));
    }

    Ok(Json(ApiResponse::success("")))
}

/// Ask the digital human service to preprocess the record's base video
///
/// Runs after the profile is persisted; a failure is logged and does not
/// undo the edit.
async fn request_preprocess(state: &AppState, outcome: &UpsertOutcome) {
    let request =
        PreprocessRequest::for_record(&state.preprocess_user_id, &state.video_dir, &outcome.record);

    info!(
        streamer_id = outcome.id,
        video_path = %request.video_path,
        "Requesting digital human preprocessing"
    );

    match state.notifier.notify(&request).await {
        Ok(()) => {
            metrics::counter!("streamer.preprocess.sent").increment(1);
        }
        Err(e) => {
            metrics::counter!("streamer.preprocess.failed").increment(1);
            warn!(
                error = %e,
                streamer_id = outcome.id,
                request_id = %request.request_id,
                "Digital human preprocessing request failed"
            );
        }
    }
}

fn store_failure(message: &str, e: StoreError) -> ApiError {
    error!(error = %e, "{}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::fail(serde_json::Value::Null)),
    )
}

/// Start the streamer API server
///
/// Returns once `shutdown` resolves and every in-flight request has finished,
/// so an edit is never cut off between saving and notifying.
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %listener.local_addr()?, "Starting streamer API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    info!("Streamer API server drained");

    Ok(())
}
