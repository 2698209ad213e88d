use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;

use gatehouse::workflows::intake::{
    ApplicationId, ApplicationRepository, ConversationGateway, IntakeService, ProvisioningSink,
};

use crate::infra::AppState;

pub(crate) fn with_intake_routes<G, R, S>(service: Arc<IntakeService<G, R, S>>) -> Router
where
    G: ConversationGateway + 'static,
    R: ApplicationRepository + 'static,
    S: ProvisioningSink + 'static,
{
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/api/v1/applications/:application_id",
            get(application_status_endpoint::<G, R, S>),
        )
        .with_state(service)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn application_status_endpoint<G, R, S>(
    State(service): State<Arc<IntakeService<G, R, S>>>,
    Path(application_id): Path<String>,
) -> Response
where
    G: ConversationGateway + 'static,
    R: ApplicationRepository + 'static,
    S: ProvisioningSink + 'static,
{
    let id = ApplicationId(application_id);
    match service.application_status(&id).await {
        Ok(Some(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(None) => {
            let payload = json!({ "error": "application not found" });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
    }
}
