//! Enphase Enlighten v4 telemetry
//!
//! Authorization (OAuth code exchange) happens elsewhere; this client only
//! needs the resulting access token, the application API key and a system id.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::{GenerationReading, LiveSeries};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnphaseApi: Send + Sync {
    /// Production readings for `system_id`; `access_token` overrides the
    /// configured token when present.
    async fn fetch_generation(
        &self,
        system_id: &str,
        access_token: Option<String>,
    ) -> Result<LiveSeries>;
}

#[derive(Debug, Clone)]
pub struct EnphaseConfig {
    pub base_url: String,
    pub api_key: String,
    pub access_token: Option<String>,
    pub http_timeout: Duration,
}

impl Default for EnphaseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.enphaseenergy.com".to_string(),
            api_key: String::new(),
            access_token: None,
            http_timeout: Duration::from_secs(15),
        }
    }
}

pub struct EnphaseClient {
    client: reqwest::Client,
    config: EnphaseConfig,
}

impl EnphaseClient {
    pub fn new(config: EnphaseConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("solar-forecast/0.1"));
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, config })
    }

    fn production_url(&self, system_id: &str) -> String {
        format!(
            "{}/api/v4/systems/{}/telemetry/production_micro",
            self.config.base_url.trim_end_matches('/'),
            system_id
        )
    }
}

#[async_trait]
impl EnphaseApi for EnphaseClient {
    async fn fetch_generation(
        &self,
        system_id: &str,
        access_token: Option<String>,
    ) -> Result<LiveSeries> {
        let token = access_token
            .or_else(|| self.config.access_token.clone())
            .context("no Enphase access token available")?;

        let url = self.production_url(system_id);
        debug!(%url, "requesting Enphase telemetry");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[("key", self.config.api_key.as_str()), ("granularity", "day")])
            .send()
            .await
            .context("Enphase GET failed")?;

        let status = resp.status();
        let body = resp.text().await.context("Enphase read failed")?;
        if !status.is_success() {
            anyhow::bail!("Enphase API error: HTTP {status}: {body}");
        }

        let telemetry: ProductionTelemetry =
            serde_json::from_str(&body).context("Enphase JSON parse failed")?;
        let series = telemetry.into_series()?;
        info!(system_id, readings = series.len(), "fetched Enphase telemetry");
        Ok(series)
    }
}

#[derive(Debug, Deserialize)]
struct ProductionTelemetry {
    #[serde(default)]
    intervals: Vec<Interval>,
}

#[derive(Debug, Deserialize)]
struct Interval {
    /// Epoch seconds at the end of the interval
    end_at: i64,
    /// Average power over the interval (W)
    powr: f64,
}

impl ProductionTelemetry {
    fn into_series(self) -> Result<LiveSeries> {
        self.intervals
            .into_iter()
            .map(|i| {
                let timestamp = DateTime::from_timestamp(i.end_at, 0)
                    .with_context(|| format!("interval end_at {} out of range", i.end_at))?
                    .naive_utc();
                Ok(GenerationReading::new(timestamp, i.powr / 1000.0))
            })
            .collect()
    }
}
