pub mod error;
pub mod forecast;
pub mod v1;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    config::ServerConfig,
    forecast::{Clock, ForecastEngine},
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ForecastEngine>,
    pub clock: Arc<dyn Clock>,
    /// Cancelled on shutdown; each request works under a child token
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState, cfg: &ServerConfig) -> Router {
    Router::new()
        .nest("/api/v1", v1::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
                .layer(TimeoutLayer::new(Duration::from_secs(cfg.request_timeout_secs))),
        )
        .layer(TraceLayer::new_for_http())
}
