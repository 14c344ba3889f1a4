// =============================================================================
// REST API — dashboard surface (§10.5)
// =============================================================================
//
// All routes live under `/api/v1/`. `/health` is public; everything else
// requires a valid Bearer token via `AuthBearer`. Handlers only read shared
// state or flip `trading_state` — they never touch the dispatcher-owned book
// snapshot or active-orders map directly.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::types::TradingState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/positions", get(positions))
        .route("/api/v1/fills", get(fills))
        .route("/api/v1/risk", get(risk))
        .route("/api/v1/paper", get(paper))
        .route("/api/v1/control/pause", post(control_pause))
        .route("/api/v1/control/resume", post(control_resume))
        .route("/api/v1/control/kill", post(control_kill))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    trading_state: TradingState,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        trading_state: *state.trading_state.read(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

async fn full_state(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn positions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.tracker.positions())
}

#[derive(Deserialize)]
struct FillsQuery {
    limit: Option<usize>,
}

async fn fills(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(q): Query<FillsQuery>,
) -> impl IntoResponse {
    Json(state.tracker.recent_fills(q.limit.unwrap_or(100)))
}

async fn risk(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.risk.snapshot())
}

async fn paper(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.paper.snapshot())
}

#[derive(Serialize)]
struct ControlResponse {
    trading_state: TradingState,
    message: String,
}

async fn control_pause(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    *state.trading_state.write() = TradingState::Paused;
    info!("trading paused via API");
    Json(ControlResponse {
        trading_state: TradingState::Paused,
        message: "trading paused".to_string(),
    })
}

async fn control_resume(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    *state.trading_state.write() = TradingState::Running;
    info!("trading resumed via API");
    Json(ControlResponse {
        trading_state: TradingState::Running,
        message: "trading resumed".to_string(),
    })
}

async fn control_kill(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    *state.trading_state.write() = TradingState::Killed;
    warn!("trading killed via API — manual restart required");
    Json(ControlResponse {
        trading_state: TradingState::Killed,
        message: "trading killed — manual restart required".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notifier::LoggingNotifier;

    #[tokio::test]
    async fn health_reports_current_trading_state() {
        let state = Arc::new(AppState::new(Config::default(), Arc::new(LoggingNotifier)));
        let resp = health(State(state.clone())).await.into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn control_pause_then_resume_flips_trading_state() {
        let state = Arc::new(AppState::new(Config::default(), Arc::new(LoggingNotifier)));
        control_resume(AuthBearer("x".into()), State(state.clone())).await;
        assert_eq!(*state.trading_state.read(), TradingState::Running);
        control_pause(AuthBearer("x".into()), State(state.clone())).await;
        assert_eq!(*state.trading_state.read(), TradingState::Paused);
    }

    #[tokio::test]
    async fn control_kill_is_terminal_in_practice() {
        let state = Arc::new(AppState::new(Config::default(), Arc::new(LoggingNotifier)));
        control_kill(AuthBearer("x".into()), State(state.clone())).await;
        assert_eq!(*state.trading_state.read(), TradingState::Killed);
    }
}
