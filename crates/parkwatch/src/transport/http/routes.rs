//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::CommandError;
use crate::slot::SlotId;
use crate::snapshot::SlotView;
use crate::status::{SyncHealth, SyncStatus};
use crate::version::VersionInfo;

/// Reservation length when the request body omits it.
const DEFAULT_RESERVE_MINUTES: i64 = 30;

const DEFAULT_OBSERVATION_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: SyncHealth,
    pub sync: SyncStatus,
    pub version: VersionInfo,
    pub total_slots: usize,
    pub available_slots: usize,
    pub running: bool,
}

impl HealthCheckResponse {
    pub fn from_engine(engine: &Engine) -> Self {
        let slots = engine.snapshots().current_slots();
        let sync = engine.snapshots().sync_status();
        Self {
            status: sync.health(),
            sync,
            version: engine.version().clone(),
            total_slots: slots.len(),
            available_slots: slots.iter().filter(|s| !s.is_reserved()).count(),
            running: engine.is_running(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    #[serde(default = "default_minutes")]
    pub minutes: i64,
}

fn default_minutes() -> i64 {
    DEFAULT_RESERVE_MINUTES
}

impl Default for ReserveRequest {
    fn default() -> Self {
        Self {
            minutes: DEFAULT_RESERVE_MINUTES,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ObservationsQuery {
    pub limit: Option<usize>,
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let status = match self {
            CommandError::UnknownSlot(_) => StatusCode::NOT_FOUND,
            CommandError::InvalidDuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

async fn health_check(State(engine): State<Arc<Engine>>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse::from_engine(&engine))
}

async fn list_slots(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(engine.snapshots().snapshot())
}

async fn get_slot(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
) -> Result<Json<SlotView>, CommandError> {
    let view = engine.snapshots().view(SlotId::new(id), Utc::now())?;
    Ok(Json(view))
}

async fn reserve_slot(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
    body: Option<Json<ReserveRequest>>,
) -> Result<Json<SlotView>, CommandError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let slot = engine
        .commands()
        .reserve(SlotId::new(id), request.minutes)?;
    Ok(Json(SlotView::new(&slot, Utc::now())))
}

async fn cancel_slot(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
) -> Result<Json<SlotView>, CommandError> {
    let slot = engine.commands().cancel(SlotId::new(id))?;
    Ok(Json(SlotView::new(&slot, Utc::now())))
}

async fn reserve_all(
    State(engine): State<Arc<Engine>>,
    body: Option<Json<ReserveRequest>>,
) -> Result<Json<Vec<SlotView>>, CommandError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let now = Utc::now();
    let slots = engine.commands().reserve_all(request.minutes)?;
    Ok(Json(slots.iter().map(|s| SlotView::new(s, now)).collect()))
}

async fn release_all(State(engine): State<Arc<Engine>>) -> Json<Vec<SlotView>> {
    let now = Utc::now();
    let slots = engine.commands().release_all();
    Json(slots.iter().map(|s| SlotView::new(s, now)).collect())
}

async fn recent_observations(
    State(engine): State<Arc<Engine>>,
    Query(query): Query<ObservationsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_OBSERVATION_LIMIT);
    Json(engine.snapshots().recent_observations(limit))
}

async fn shutdown(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    engine.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

pub fn routes(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/shutdown", post(shutdown))
        .route("/slots", get(list_slots))
        .route("/slots/reserve-all", post(reserve_all))
        .route("/slots/release-all", post(release_all))
        .route("/slots/{id}", get(get_slot))
        .route("/slots/{id}/reserve", post(reserve_slot))
        .route("/slots/{id}/cancel", post(cancel_slot))
        .route("/observations", get(recent_observations))
        .with_state(engine)
}
