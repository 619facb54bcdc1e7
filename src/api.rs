//! HTTP surface for storefront sessions

use axum::{extract::{Path, State}, http::StatusCode, routing::{get, post}, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::watcher::{CartSnapshot, SessionRegistry, WatchReport};
use crate::SyncError;

#[derive(Clone)] pub struct AppState { pub registry: Arc<SessionRegistry> }

#[derive(Debug, Serialize)] pub struct SessionStatus { pub session_id: String, pub refresh_generation: u64, pub vip_in_flight: bool, pub vip_pending: bool, pub bundle_syncing: bool }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront-sync"})) }))
        .route("/api/v1/sessions/:session", get(get_session).delete(delete_session))
        .route("/api/v1/sessions/:session/observe", post(observe))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive())).with_state(state)
}

fn not_found(e: SyncError) -> (StatusCode, String) { (StatusCode::NOT_FOUND, e.to_string()) }

async fn observe(State(s): State<AppState>, Path(session): Path<String>, Json(snapshot): Json<CartSnapshot>) -> Result<Json<WatchReport>, (StatusCode, String)> {
    if session.trim().is_empty() { return Err((StatusCode::BAD_REQUEST, "Session id required".to_string())); }
    let watcher = s.registry.get_or_create(&session);
    Ok(Json(watcher.observe(&snapshot).await))
}

async fn get_session(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<SessionStatus>, (StatusCode, String)> {
    let w = s.registry.get(&session).ok_or(SyncError::SessionNotFound).map_err(not_found)?;
    Ok(Json(SessionStatus {
        session_id: w.session_id().to_string(), refresh_generation: w.refresh().generation(),
        vip_in_flight: w.vip().is_in_flight(), vip_pending: w.vip().is_pending(), bundle_syncing: w.bundle().is_syncing(),
    }))
}

async fn delete_session(State(s): State<AppState>, Path(session): Path<String>) -> Result<StatusCode, (StatusCode, String)> {
    if !s.registry.remove(&session) { return Err(not_found(SyncError::SessionNotFound)); }
    Ok(StatusCode::NO_CONTENT)
}
