//! HTTP routes.

use crate::error::ServerError;
use crate::state::AppState;
use crate::views::{pod_views, NamespaceQuery, PodView};
use crate::websocket;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use cluster_client::NamespaceScope;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/namespaces", get(list_namespaces))
        .route("/pods", get(list_pods))
        .route("/pods/{ns}", get(list_namespace_pods))
        .route("/deletePod/{ns}/{pname}", delete(delete_pod).post(delete_pod))
        .route("/ws/pods", get(websocket::ws_pods))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_namespaces(State(state): State<AppState>) -> Result<Json<Vec<String>>, ServerError> {
    let namespaces = state.client().list_namespaces().await?;
    debug!("Serving {} namespaces", namespaces.len());
    Ok(Json(namespaces))
}

async fn list_pods(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<Vec<PodView>>, ServerError> {
    let scope = state.config.scope_for(query.ns.as_deref());
    pods_in(&state, &scope).await
}

async fn list_namespace_pods(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> Result<Json<Vec<PodView>>, ServerError> {
    let scope = state.config.scope_for(Some(&ns));
    pods_in(&state, &scope).await
}

async fn pods_in(state: &AppState, scope: &NamespaceScope) -> Result<Json<Vec<PodView>>, ServerError> {
    let session = state.synced_session(scope).await?;
    let snapshot = session.current_summaries()?;
    debug!("Serving {} pods in {}", snapshot.len(), scope);
    Ok(Json(pod_views(&snapshot)))
}

async fn delete_pod(
    State(state): State<AppState>,
    Path((ns, pname)): Path<(String, String)>,
) -> Result<StatusCode, ServerError> {
    info!("Delete requested for pod {}/{}", ns, pname);
    state.client().delete_pod(&ns, &pname).await?;
    Ok(StatusCode::NO_CONTENT)
}
