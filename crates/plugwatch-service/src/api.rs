//! HTTP control surface.
//!
//! Thin request/response glue over the device backend: status passthrough,
//! socket listing and switch control. Every control endpoint answers
//! `{"message": ..., "status": "success"}` on success and `{"error": ...}`
//! with HTTP 500 on a backend failure; in local mode, control of anything
//! but the master switch answers HTTP 501 because the firmware only maps
//! sockets by index.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use plugwatch_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use time::OffsetDateTime;

use plugwatch_core::SwitchTarget;

use crate::state::{AppState, BackendMode};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/sockets", get(get_sockets))
        .route("/on", get(master_on).post(master_on))
        .route("/off", get(master_off).post(master_off))
        .route("/switch/{index}/on", get(switch_on).post(switch_on))
        .route("/switch/{index}/off", get(switch_off).post(switch_off))
}

/// Capability listing.
async fn index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "device": state.config.device.name,
        "id": state.config.device.id,
        "endpoints": [
            {"url": "/on", "method": "GET/POST", "desc": "Turn master switch ON"},
            {"url": "/off", "method": "GET/POST", "desc": "Turn master switch OFF"},
            {"url": "/switch/{index}/on", "method": "GET/POST", "desc": "Turn a specific switch ON (e.g. 1, 2, usb1)"},
            {"url": "/switch/{index}/off", "method": "GET/POST", "desc": "Turn a specific switch OFF"},
            {"url": "/status", "method": "GET", "desc": "Get device status"},
            {"url": "/sockets", "method": "GET", "desc": "List switch states"},
        ],
    }))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Raw device status passthrough.
async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let points = state
        .device
        .backend()
        .status()
        .await
        .map_err(|e| AppError::internal(e).with_hint("Check your configuration"))?;
    Ok(Json(serde_json::json!({ "result": points })))
}

/// Socket listing: normalized `{code, value}` pairs in cloud mode, the raw
/// index-keyed DPS map in local mode.
async fn get_sockets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let points = state
        .device
        .backend()
        .status()
        .await
        .map_err(AppError::internal)?;

    match state.device.mode() {
        BackendMode::Local => {
            let mut dps = serde_json::Map::new();
            for point in &points {
                if let Some(key) = dps_key(&point.code) {
                    dps.insert(key, point.value.clone());
                }
            }
            Ok(Json(serde_json::json!({"type": "local", "dps": dps})))
        }
        BackendMode::Cloud => {
            let sockets: Vec<_> = points.into_iter().filter(|p| p.is_switch()).collect();
            Ok(Json(serde_json::json!({ "sockets": sockets })))
        }
    }
}

async fn master_on(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    control(&state, SwitchTarget::master(), true).await
}

async fn master_off(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    control(&state, SwitchTarget::master(), false).await
}

async fn switch_on(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    control(&state, SwitchTarget::parse(&index), true).await
}

async fn switch_off(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    control(&state, SwitchTarget::parse(&index), false).await
}

/// Drive one switch, with the local-mode master-only restriction.
async fn control(
    state: &AppState,
    target: SwitchTarget,
    on: bool,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.device.is_local() && !target.is_master() {
        return Err(AppError::not_implemented(
            "Local control for specific sockets requires a data-point mapping. \
             Use cloud mode for code-based control.",
        ));
    }

    state
        .device
        .backend()
        .set_switch(&target, on)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(serde_json::json!({
        "message": format!("Sent {on} to {}", target.cloud_code()),
        "status": "success",
    })))
}

/// Map a switch code back to its DPS index: `switch` is index 1,
/// `switch_2` is index 2. Non-switch codes have no DPS slot here.
fn dps_key(code: &str) -> Option<String> {
    if code == "switch" {
        Some("1".to_string())
    } else {
        let rest = code.strip_prefix("switch_")?;
        if rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty() {
            Some(rest.to_string())
        } else {
            None
        }
    }
}

/// API error carrying an HTTP status and a JSON body.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
    hint: Option<&'static str>,
}

impl AppError {
    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
            hint: None,
        }
    }

    fn not_implemented(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_IMPLEMENTED,
            message: message.to_string(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let mut body = serde_json::json!({ "error": self.message });
        if let Some(hint) = self.hint {
            body["hint"] = hint.into();
        }
        (self.status, Json(body)).into_response()
    }
}
