//! Forecast orchestration
//!
//! Every request yields a forecast without live data. Sites with an inverter
//! additionally get a forecast fed with live telemetry, with the no-live
//! series attached as a comparison column. Weather and telemetry are fetched
//! concurrently; weather failures abort the request, telemetry failures only
//! degrade it.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::dataset::WeatherDataset;
use super::error::NwpError;
use super::model::ForecastModel;
use super::pv::{harmonize, GenerationDataset};
use super::weather::NwpProvider;
use crate::domain::{
    format_timestamp, LiveDataStatus, LiveSeries, PowerPoint, PredictionTable, Site, POWER_KW,
    POWER_KW_NO_LIVE,
};
use crate::hardware::{
    LiveGenerationSource, TelemetryFactory, TelemetryOverrides, TelemetryUnavailable,
};

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Nwp(#[from] NwpError),
    #[error("forecast model failed: {0:#}")]
    Model(anyhow::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("forecast request cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub site: Site,
    /// Naive reference time
    pub ts: NaiveDateTime,
    pub nwp_source: String,
    pub overrides: TelemetryOverrides,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ForecastResponse {
    /// Reference time as `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    pub predictions: PredictionTable,
    pub live_data: LiveDataStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineTimeouts {
    pub nwp: Duration,
    pub telemetry: Duration,
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            nwp: Duration::from_secs(60),
            telemetry: Duration::from_secs(20),
        }
    }
}

pub struct ForecastEngine {
    nwp: Arc<dyn NwpProvider>,
    telemetry: TelemetryFactory,
    model: Arc<dyn ForecastModel>,
    timeouts: EngineTimeouts,
}

impl ForecastEngine {
    pub fn new(
        nwp: Arc<dyn NwpProvider>,
        telemetry: TelemetryFactory,
        model: Arc<dyn ForecastModel>,
    ) -> Self {
        Self {
            nwp,
            telemetry,
            model,
            timeouts: EngineTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: EngineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub async fn forecast(
        &self,
        request: &ForecastRequest,
        cancel: &CancellationToken,
    ) -> Result<ForecastResponse, ForecastError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ForecastError::Cancelled),
            result = self.run(request) => result,
        }
    }

    async fn run(&self, request: &ForecastRequest) -> Result<ForecastResponse, ForecastError> {
        let ts = request.ts;
        let site = &request.site;

        // a weather failure drops the telemetry fetch still in flight
        let (weather, live) = tokio::try_join!(
            self.fetch_weather(site, ts, &request.nwp_source),
            async { Ok::<_, NwpError>(self.fetch_live(site, &request.overrides).await) },
        )?;

        let no_live_pv = harmonize(None, ts, &site.without_inverter());
        let no_live = self.predict(&weather, &no_live_pv, ts)?;

        if !site.has_inverter() {
            let mut predictions = PredictionTable::from_series(POWER_KW, &no_live);
            predictions.rename_column(POWER_KW, POWER_KW_NO_LIVE);
            return Ok(ForecastResponse {
                timestamp: format_timestamp(ts),
                predictions,
                live_data: LiveDataStatus::NotRequested,
            });
        }

        let (series, live_data) = resolve_live(site, live, ts);
        let live_pv = harmonize(series.as_ref(), ts, site);
        let with_live = self.predict(&weather, &live_pv, ts)?;

        let mut predictions = PredictionTable::from_series(POWER_KW, &with_live);
        predictions.insert_column(POWER_KW_NO_LIVE, &no_live);

        Ok(ForecastResponse {
            timestamp: format_timestamp(ts),
            predictions,
            live_data,
        })
    }

    async fn fetch_weather(
        &self,
        site: &Site,
        ts: NaiveDateTime,
        source: &str,
    ) -> Result<WeatherDataset, NwpError> {
        match timeout(self.timeouts.nwp, self.nwp.fetch_nwp(site, ts, source)).await {
            Ok(result) => result,
            Err(_) => Err(NwpError::UpstreamUnavailable(format!(
                "timed out after {:?}",
                self.timeouts.nwp
            ))),
        }
    }

    async fn fetch_live(
        &self,
        site: &Site,
        overrides: &TelemetryOverrides,
    ) -> Result<LiveSeries, TelemetryUnavailable> {
        let adapter = self.telemetry.adapter_for(&site.inverter_type, overrides);
        match timeout(self.timeouts.telemetry, adapter.fetch_live_generation(site)).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryUnavailable::Timeout(site.inverter_type.clone())),
        }
    }

    fn predict(
        &self,
        weather: &WeatherDataset,
        pv: &GenerationDataset,
        ts: NaiveDateTime,
    ) -> Result<Vec<PowerPoint>, ForecastError> {
        self.model
            .predict(weather, pv, ts)
            .map_err(ForecastError::Model)
    }
}

fn resolve_live(
    site: &Site,
    live: Result<LiveSeries, TelemetryUnavailable>,
    ts: NaiveDateTime,
) -> (Option<LiveSeries>, LiveDataStatus) {
    let reason = match live {
        Ok(series) => {
            let readings = series.up_to(ts).count();
            if readings > 0 {
                info!(inverter = %site.inverter_type, readings, "using live telemetry");
                return (Some(series), LiveDataStatus::Used { readings });
            }
            TelemetryUnavailable::Empty(site.inverter_type.clone())
        }
        Err(reason) => reason,
    };

    warn!(
        inverter = %site.inverter_type,
        reason = %reason,
        "live telemetry unavailable, forecasting without it"
    );
    (
        None,
        LiveDataStatus::Unavailable {
            reason: reason.to_string(),
        },
    )
}

/// Reference time for a request.
///
/// Offsets are dropped without converting, keeping the wall-clock time the
/// caller wrote. Naive datetimes and bare dates are taken as-is; no value
/// means `now`.
pub fn resolve_timestamp(
    raw: Option<&str>,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, ForecastError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(now);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }
    Err(ForecastError::InvalidRequest(format!(
        "unrecognised timestamp {raw:?}"
    )))
}
