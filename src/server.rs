use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{
    error::ServiceError,
    model::{PredictionRequest, PredictionResult},
    service::{PredictionService, RegistrationReport},
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

pub fn build_router(service: Arc<PredictionService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/", get(root))
        .route("/models", get(models))
        .route("/:phase/:problem/predict", post(predict))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse { message: "hello" })
}

async fn models(State(state): State<AppState>) -> Json<RegistrationReport> {
    Json(state.service.report())
}

async fn predict(
    State(state): State<AppState>,
    Path((phase, problem)): Path<(String, String)>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>, ServiceError> {
    let Json(request) = payload.map_err(|rejection| ServiceError::Schema(rejection.body_text()))?;
    let result = state.service.predict(&phase, &problem, request).await?;
    Ok(Json(result))
}
