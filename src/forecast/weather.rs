//! NWP retrieval from Open-Meteo
//!
//! Recent requests go to the ICON or GFS forecast endpoint picked by the
//! caller; anything older than [`HISTORICAL_CUTOFF_DAYS`] goes to the
//! reanalysis archive instead. Visibility always comes from GFS, or is
//! pinned to [`MAX_VISIBILITY_M`] when the archive is used since it does not
//! publish it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, info, warn};

use super::cache::ResponseCache;
use super::dataset::{normalize, HourlyWeatherTable, WeatherDataset};
use super::error::NwpError;
use crate::domain::Site;

/// Requests further back than this are served from the archive
pub const HISTORICAL_CUTOFF_DAYS: i64 = 90;
pub const WINDOW_DAYS: i64 = 7;
/// Visibility used when the archive is the source (metres)
pub const MAX_VISIBILITY_M: f64 = 24000.0;

/// Open-Meteo hourly variable and the name the model knows it by
pub const HOURLY_VARIABLES: [(&str, &str); 8] = [
    ("temperature_2m", "t"),
    ("precipitation", "prate"),
    ("cloud_cover_low", "lcc"),
    ("cloud_cover_mid", "mcc"),
    ("cloud_cover_high", "hcc"),
    ("wind_speed_10m", "si10"),
    ("shortwave_radiation", "dswrf"),
    ("direct_radiation", "dlwrf"),
];
pub const VISIBILITY: (&str, &str) = ("visibility", "vis");

/// Forecast models a caller may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum NwpSource {
    Icon,
    Gfs,
}

/// Provider endpoint actually queried for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NwpEndpoint {
    Icon,
    Gfs,
    Archive,
}

impl NwpEndpoint {
    /// Pick the endpoint for `source` at reference time `ts`.
    ///
    /// The archive branch wins regardless of `source`, so an unknown source
    /// is only rejected for recent requests.
    pub fn select(source: &str, ts: NaiveDateTime, now: NaiveDateTime) -> Result<Self, NwpError> {
        if is_historical(ts, now) {
            return Ok(Self::Archive);
        }
        match source.parse::<NwpSource>() {
            Ok(NwpSource::Icon) => Ok(Self::Icon),
            Ok(NwpSource::Gfs) => Ok(Self::Gfs),
            Err(_) => Err(NwpError::InvalidSource(source.to_string())),
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Self::Icon => "v1/dwd-icon",
            Self::Gfs => "v1/gfs",
            Self::Archive => "v1/archive",
        }
    }
}

/// Whole days between `ts` and `now` exceed the archive cutoff
pub fn is_historical(ts: NaiveDateTime, now: NaiveDateTime) -> bool {
    (now - ts).num_days() > HISTORICAL_CUTOFF_DAYS
}

/// Calendar window requested from the provider: the reference date plus
/// [`WINDOW_DAYS`] days, both ends inclusive on the provider side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NwpWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl NwpWindow {
    pub fn for_timestamp(ts: NaiveDateTime) -> Self {
        let start = ts.date();
        Self {
            start,
            end: start + Duration::days(WINDOW_DAYS),
        }
    }
}

/// Source of "now" for the archive cutoff
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall-clock UTC time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NwpProvider: Send + Sync {
    async fn fetch_nwp(
        &self,
        site: &Site,
        ts: NaiveDateTime,
        source: &str,
    ) -> Result<WeatherDataset, NwpError>;
}

#[derive(Debug, Clone)]
pub struct OpenMeteoConfig {
    pub forecast_base_url: String,
    pub archive_base_url: String,
    pub max_retries: u32,
    /// First retry delay; doubles on each attempt
    pub backoff_base: std::time::Duration,
    pub http_timeout: std::time::Duration,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            forecast_base_url: "https://api.open-meteo.com".to_string(),
            archive_base_url: "https://archive-api.open-meteo.com".to_string(),
            max_retries: 5,
            backoff_base: std::time::Duration::from_millis(200),
            http_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// Open-Meteo client with retry and a never-expiring response cache.
///
/// Build one per process and share it; the cache is what makes repeated
/// identical requests free.
pub struct OpenMeteoClient {
    http: ClientWithMiddleware,
    cache: Arc<dyn ResponseCache>,
    config: OpenMeteoConfig,
    clock: Arc<dyn Clock>,
}

impl OpenMeteoClient {
    pub fn new(config: OpenMeteoConfig, cache: Arc<dyn ResponseCache>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("solar-forecast/0.1"));
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()?;

        let max_delay = config.backoff_base * 2u32.saturating_pow(config.max_retries);
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(config.backoff_base, max_delay)
            .build_with_max_retries(config.max_retries);
        let http = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            http,
            cache,
            config,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetch and normalize weather for `site` around `ts`, using `now` for
    /// the archive cutoff.
    pub async fn fetch_at(
        &self,
        site: &Site,
        ts: NaiveDateTime,
        source: &str,
        now: NaiveDateTime,
    ) -> Result<WeatherDataset, NwpError> {
        let table = self.fetch_table(site, ts, source, now).await?;
        normalize(&table, source, site)
    }

    pub async fn fetch_table(
        &self,
        site: &Site,
        ts: NaiveDateTime,
        source: &str,
        now: NaiveDateTime,
    ) -> Result<HourlyWeatherTable, NwpError> {
        let endpoint = NwpEndpoint::select(source, ts, now)?;
        let window = NwpWindow::for_timestamp(ts);

        if endpoint == NwpEndpoint::Archive {
            warn!(
                %ts,
                "timestamp is more than {} days in the past, using reanalysis archive instead of {}",
                HISTORICAL_CUTOFF_DAYS,
                source
            );
        }

        let names: Vec<&str> = HOURLY_VARIABLES.iter().map(|(api, _)| *api).collect();
        let mut hourly = self.get_hourly(endpoint, site, window, &names).await?;
        if hourly.index.is_empty() {
            return Err(NwpError::EmptyData);
        }

        let mut table = HourlyWeatherTable::new(hourly.index.clone());
        for (api, short) in HOURLY_VARIABLES {
            table = table.with_column(short, hourly.take(api)?)?;
        }

        let table = if endpoint == NwpEndpoint::Archive {
            table.with_constant(VISIBILITY.1, MAX_VISIBILITY_M)
        } else {
            let mut vis = self
                .get_hourly(NwpEndpoint::Gfs, site, window, &[VISIBILITY.0])
                .await?;
            table.with_column(VISIBILITY.1, vis.take(VISIBILITY.0)?)?
        };

        info!(
            ?endpoint,
            rows = table.len(),
            latitude = site.latitude,
            longitude = site.longitude,
            "fetched NWP data"
        );
        Ok(table)
    }

    fn url_for(&self, endpoint: NwpEndpoint) -> String {
        let base = match endpoint {
            NwpEndpoint::Archive => &self.config.archive_base_url,
            NwpEndpoint::Icon | NwpEndpoint::Gfs => &self.config.forecast_base_url,
        };
        format!("{}/{}", base.trim_end_matches('/'), endpoint.path())
    }

    async fn get_hourly(
        &self,
        endpoint: NwpEndpoint,
        site: &Site,
        window: NwpWindow,
        variables: &[&str],
    ) -> Result<HourlySeries, NwpError> {
        let params = [
            ("latitude", site.latitude.to_string()),
            ("longitude", site.longitude.to_string()),
            ("start_date", window.start.to_string()),
            ("end_date", window.end.to_string()),
            ("hourly", variables.join(",")),
            ("timeformat", "unixtime".to_string()),
        ];
        let url = Url::parse_with_params(&self.url_for(endpoint), &params)
            .map_err(|e| NwpError::UpstreamUnavailable(format!("invalid NWP url: {e}")))?;
        let key = url.as_str().to_string();

        if let Some(body) = self.cache.get(&key).await {
            debug!(%url, "NWP cache hit");
            return HourlySeries::decode(&body);
        }

        debug!(%url, "requesting NWP data");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let reason = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.reason)
                .unwrap_or(body);
            return Err(NwpError::UpstreamUnavailable(format!(
                "HTTP {status}: {reason}"
            )));
        }

        // decode before caching so a bad body is never replayed
        let series = HourlySeries::decode(&body)?;
        if let Err(e) = self.cache.put(&key, &body).await {
            warn!(error = %e, "failed to cache NWP response");
        }
        Ok(series)
    }
}

#[async_trait]
impl NwpProvider for OpenMeteoClient {
    async fn fetch_nwp(
        &self,
        site: &Site,
        ts: NaiveDateTime,
        source: &str,
    ) -> Result<WeatherDataset, NwpError> {
        self.fetch_at(site, ts, source, self.clock.now()).await
    }
}

/// Decoded `hourly` block: time index plus per-variable values (nulls as NaN)
#[derive(Debug)]
struct HourlySeries {
    index: Vec<NaiveDateTime>,
    values: HashMap<String, Vec<f64>>,
}

impl HourlySeries {
    fn decode(body: &str) -> Result<Self, NwpError> {
        let response: OpenMeteoResponse = serde_json::from_str(body)
            .map_err(|e| NwpError::MalformedResponse(e.to_string()))?;
        let Some(hourly) = response.hourly else {
            return Err(NwpError::MalformedResponse("missing hourly block".to_string()));
        };

        let index = time_index(&hourly.time)?;
        let values = hourly
            .variables
            .into_iter()
            .map(|(name, vals)| {
                let vals = vals.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
                (name, vals)
            })
            .collect();
        Ok(Self { index, values })
    }

    fn take(&mut self, variable: &str) -> Result<Vec<f64>, NwpError> {
        self.values
            .remove(variable)
            .ok_or_else(|| NwpError::MalformedResponse(format!("missing variable {variable}")))
    }
}

/// Rebuild the hourly index from start, interval and row count, left-inclusive
/// on `[start, start + n * interval)`.
fn time_index(times: &[i64]) -> Result<Vec<NaiveDateTime>, NwpError> {
    let Some(&start) = times.first() else {
        return Ok(Vec::new());
    };
    let interval = match times.get(1) {
        Some(next) => next.checked_sub(start).ok_or_else(|| {
            NwpError::MalformedResponse(format!("time axis step from {start} to {next} overflows"))
        })?,
        None => 3600,
    };
    if interval <= 0 {
        return Err(NwpError::MalformedResponse(format!(
            "non-increasing time axis (interval {interval}s)"
        )));
    }

    let end = i64::try_from(times.len())
        .ok()
        .and_then(|n| interval.checked_mul(n))
        .and_then(|span| start.checked_add(span))
        .ok_or_else(|| {
            NwpError::MalformedResponse(format!(
                "time axis starting at {start} with interval {interval}s overflows"
            ))
        })?;
    (start..end)
        .step_by(interval as usize)
        .map(|secs| {
            DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| NwpError::MalformedResponse(format!("timestamp {secs} out of range")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    hourly: Option<HourlyBlock>,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<i64>,
    #[serde(flatten)]
    variables: HashMap<String, Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    reason: String,
}
