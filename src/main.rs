use anyhow::{Context, Result};
use solar_forecast::{api, config, forecast, hardware, telemetry};
use config::Config;
use forecast::{DiskCache, ForecastEngine, MemoryCache, OpenMeteoClient, ResponseCache, SystemClock};
use hardware::{EnphaseClient, SolisClient, TelemetryFactory};
use std::sync::Arc;
use telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load().context("loading configuration")?;

    let cache: Arc<dyn ResponseCache> = match &cfg.nwp.cache_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "caching NWP responses on disk");
            Arc::new(DiskCache::new(dir))
        }
        None => Arc::new(MemoryCache::new()),
    };
    let clock = Arc::new(SystemClock);
    let nwp = OpenMeteoClient::new(cfg.nwp.client_config(), cache)
        .context("building NWP client")?
        .with_clock(clock.clone());

    let mut inverters = TelemetryFactory::new();
    match cfg.inverters.enphase.client_config() {
        Some(enphase) => {
            let client = EnphaseClient::new(enphase).context("building Enphase client")?;
            inverters =
                inverters.with_enphase(Arc::new(client), cfg.inverters.enphase.system_id.clone());
        }
        None => warn!("no Enphase API key configured, Enphase sites will forecast without live data"),
    }
    match cfg.inverters.solis.client_config() {
        Some(solis) => {
            let client = SolisClient::new(solis).context("building SolisCloud client")?;
            inverters = inverters.with_solis(Arc::new(client));
        }
        None => warn!("SolisCloud credentials incomplete, Solis sites will forecast without live data"),
    }

    let engine = ForecastEngine::new(Arc::new(nwp), inverters, Arc::new(cfg.model.build()))
        .with_timeouts(cfg.engine_timeouts());

    let shutdown = CancellationToken::new();
    let state = api::AppState {
        engine: Arc::new(engine),
        clock,
        shutdown: shutdown.clone(),
    };
    let app = api::router(state, &cfg.server);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0, the API is reachable from the network");
    }
    info!(%addr, "starting solar forecast service");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            telemetry::shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    warn!("shutdown complete");
    Ok(())
}
