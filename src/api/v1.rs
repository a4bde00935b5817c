use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::{forecast::create_forecast, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/forecast", post(create_forecast))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
