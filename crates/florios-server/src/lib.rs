//! Read-only HTTP view of a monitoring session.
//!
//! Serves the latest device states, derived display metrics and trend
//! histories as JSON, so presentation layers outside the terminal can follow
//! the same session the poller is updating.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::Serialize;

use florios_core::{
    CycleStats, DeviceState, DeviceView, HistoryPoint, SessionSnapshot, SharedSession,
    lock_session,
};

/// Shared server state.
struct AppState {
    session: SharedSession,
}

impl AppState {
    // The guard never crosses an await point.
    fn snapshot(&self) -> SessionSnapshot {
        lock_session(&self.session).snapshot()
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    connected: bool,
    devices: usize,
    low_volume: bool,
    stats: CycleStats,
}

#[derive(Serialize)]
struct DevicesResponse {
    devices: Vec<DeviceResponse>,
    total: usize,
}

#[derive(Serialize)]
struct DeviceResponse {
    state: DeviceState,
    view: DeviceView,
    history_points: usize,
}

#[derive(Serialize)]
struct HistoryResponse {
    device_id: String,
    start_time: i64,
    capacity: usize,
    /// Newest first.
    points: Vec<HistoryPoint>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn unknown_device(id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Unknown device: {id}. Use /devices to list known devices."),
        }),
    )
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.snapshot();
    Json(HealthResponse {
        status: snapshot.connectivity.label().to_lowercase(),
        connected: snapshot.connectivity.is_connected(),
        devices: snapshot.devices.len(),
        low_volume: snapshot.any_low_volume(),
        stats: snapshot.stats,
    })
}

async fn handle_devices(State(state): State<Arc<AppState>>) -> Json<DevicesResponse> {
    let snapshot = state.snapshot();
    let now = now_epoch();
    let devices: Vec<DeviceResponse> = snapshot
        .devices
        .iter()
        .map(|entry| DeviceResponse {
            view: snapshot.view(entry, now),
            history_points: entry.history.len(),
            state: entry.state.clone(),
        })
        .collect();
    let total = devices.len();
    Json(DevicesResponse { devices, total })
}

async fn handle_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceResponse>, ApiError> {
    let snapshot = state.snapshot();
    let entry = snapshot.device(&id).ok_or_else(|| unknown_device(&id))?;
    Ok(Json(DeviceResponse {
        view: snapshot.view(entry, now_epoch()),
        history_points: entry.history.len(),
        state: entry.state.clone(),
    }))
}

async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let snapshot = state.snapshot();
    let entry = snapshot.device(&id).ok_or_else(|| unknown_device(&id))?;
    Ok(Json(HistoryResponse {
        device_id: entry.state.device_id.clone(),
        start_time: entry.state.start_time,
        capacity: entry.history.capacity(),
        points: entry.history.newest_first(),
    }))
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.snapshot();
    Json(serde_json::json!({
        "name": "Florios Monitor",
        "version": florios_core::VERSION,
        "connectivity": snapshot.connectivity,
        "devices": snapshot.devices.len(),
        "low_volume_threshold": snapshot.low_volume_threshold,
        "endpoints": {
            "/": "This API index",
            "/health": "Connectivity and poll cycle counters",
            "/devices": "Latest state and derived metrics for every known device",
            "/devices/{id}": "Latest state and derived metrics for one device",
            "/devices/{id}/history": "Trend history for one device, newest first",
        },
    }))
}

/// Build the axum router over a shared session.
pub fn build_router(session: SharedSession) -> Router {
    let state = Arc::new(AppState { session });

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/devices", get(handle_devices))
        .route("/devices/{id}", get(handle_device))
        .route("/devices/{id}/history", get(handle_history))
        .with_state(state)
}

/// Serve the session until the listener fails.
pub async fn run_server(session: SharedSession, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(session);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("serving session on http://{addr}");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use florios_core::{FeedError, MonitorSession, shared};
    use serde_json::json;

    fn state_with_b7() -> Arc<AppState> {
        let session = shared(MonitorSession::default());
        {
            let mut guard = lock_session(&session);
            guard.apply_snapshot(
                &json!([
                    {"bottle_id": "B7", "timestamp": 1_000, "remaining_volume": 250.0,
                     "fill_h": 500.0, "infusion_rate": 2.0},
                    {"bottle_id": "B8", "timestamp": 1_000, "remaining_volume": 15.0,
                     "fill_h": 500.0}
                ]),
                1_000,
            );
            guard.apply_snapshot(
                &json!([{"bottle_id": "B7", "timestamp": 1_060, "remaining_volume": 248.0,
                         "fill_h": 500.0, "infusion_rate": 2.0}]),
                1_060,
            );
        }
        Arc::new(AppState { session })
    }

    #[tokio::test]
    async fn health_reports_connectivity() {
        let state = state_with_b7();
        let Json(health) = handle_health(State(Arc::clone(&state))).await;
        assert_eq!(health.status, "connected");
        assert!(health.connected);
        assert_eq!(health.devices, 2);
        assert!(health.low_volume);
        assert_eq!(health.stats.ok_cycles, 2);

        lock_session(&state.session).record_failure(&FeedError::Status(502));
        let Json(health) = handle_health(State(state)).await;
        assert_eq!(health.status, "disconnected");
        assert!(!health.connected);
        assert_eq!(health.devices, 2);
    }

    #[tokio::test]
    async fn devices_include_views() {
        let Json(resp) = handle_devices(State(state_with_b7())).await;
        assert_eq!(resp.total, 2);
        let b7 = &resp.devices[0];
        assert_eq!(b7.state.device_id, "B7");
        assert_eq!(b7.view.percentage, Some(50.0));
        assert_eq!(b7.view.time_remaining, "2h 4m");
        assert_eq!(b7.history_points, 2);
        assert!(resp.devices[1].view.low_volume);
    }

    #[tokio::test]
    async fn device_lookup_and_404() {
        let state = state_with_b7();
        let Json(b7) = handle_device(State(Arc::clone(&state)), Path("B7".into()))
            .await
            .unwrap();
        assert_eq!(b7.state.start_time, 1_000);

        let Err((status, Json(err))) =
            handle_device(State(state), Path("B99".into())).await
        else {
            panic!("expected 404");
        };
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(err.error.contains("B99"));
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let state = state_with_b7();
        let Json(history) = handle_history(State(Arc::clone(&state)), Path("B7".into()))
            .await
            .unwrap();
        let times: Vec<i64> = history.points.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![1_060, 1_000]);
        assert_eq!(history.capacity, 50);

        let missing = handle_history(State(state), Path("nope".into())).await;
        assert!(matches!(missing, Err((StatusCode::NOT_FOUND, _))));
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let Json(index) = handle_index(State(state_with_b7())).await;
        assert_eq!(index["devices"], 2);
        assert_eq!(index["connectivity"], "connected");
        assert!(index["endpoints"]["/devices/{id}/history"].is_string());
    }

    #[test]
    fn router_builds() {
        let _ = build_router(shared(MonitorSession::default()));
    }
}
