//! SolisCloud platform telemetry
//!
//! Every request is signed: `Content-MD5` over the exact body, then an
//! HMAC-SHA1 over verb, digest, content type, date and path, sent as
//! `Authorization: API {key_id}:{signature}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, DATE, USER_AGENT,
};
use serde::Deserialize;
use serde_json::json;
use sha1::Sha1;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::{GenerationReading, LiveSeries};

const STATION_DAY_PATH: &str = "/v1/api/stationDay";
const CONTENT_TYPE_JSON: &str = "application/json;charset=UTF-8";
const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// SolisCloud generation feed.
///
/// The client reads its station and credentials from its own configuration,
/// so the call carries no site argument. `Ok(None)` means the provider
/// answered but had nothing to report.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SolisApi: Send + Sync {
    async fn fetch_generation(&self) -> Result<Option<LiveSeries>>;
}

#[derive(Debug, Clone)]
pub struct SolisConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub station_id: String,
    pub http_timeout: Duration,
}

impl Default for SolisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.soliscloud.com:13333".to_string(),
            key_id: String::new(),
            key_secret: String::new(),
            station_id: String::new(),
            http_timeout: Duration::from_secs(15),
        }
    }
}

pub struct SolisClient {
    client: reqwest::Client,
    config: SolisConfig,
}

impl SolisClient {
    pub fn new(config: SolisConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("solar-forecast/0.1"));
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, config })
    }

    /// Five-minute power readings of the configured station for `day` (UTC)
    pub async fn station_day(&self, day: NaiveDate, now: DateTime<Utc>) -> Result<Option<LiveSeries>> {
        let body = json!({
            "id": self.config.station_id,
            "money": "EUR",
            "time": day.format("%Y-%m-%d").to_string(),
            "timeZone": 0,
        })
        .to_string();
        let headers = self.signed_headers(STATION_DAY_PATH, &body, now)?;

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), STATION_DAY_PATH);
        debug!(%url, station = %self.config.station_id, "requesting SolisCloud station day");
        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .context("SolisCloud POST failed")?;

        let status = resp.status();
        let text = resp.text().await.context("SolisCloud read failed")?;
        if !status.is_success() {
            anyhow::bail!("SolisCloud API error: HTTP {status}: {text}");
        }

        let envelope: StationDayResponse =
            serde_json::from_str(&text).context("SolisCloud JSON parse failed")?;
        let series = envelope.into_series()?;
        if let Some(series) = &series {
            info!(station = %self.config.station_id, readings = series.len(), "fetched SolisCloud telemetry");
        }
        Ok(series)
    }

    fn signed_headers(&self, path: &str, body: &str, now: DateTime<Utc>) -> Result<HeaderMap> {
        let digest = content_md5(body);
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let signature = sign(&self.config.key_secret, &digest, CONTENT_TYPE_JSON, &date, path)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(CONTENT_MD5, HeaderValue::from_str(&digest)?);
        headers.insert(DATE, HeaderValue::from_str(&date)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("API {}:{}", self.config.key_id, signature))
                .context("SolisCloud key id is not a valid header value")?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl SolisApi for SolisClient {
    async fn fetch_generation(&self) -> Result<Option<LiveSeries>> {
        let now = Utc::now();
        self.station_day(now.date_naive(), now).await
    }
}

/// Base64 of the MD5 digest of `body`
fn content_md5(body: &str) -> String {
    STANDARD.encode(md5::compute(body.as_bytes()).0)
}

fn sign(secret: &str, content_md5: &str, content_type: &str, date: &str, path: &str) -> Result<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("SolisCloud key secret rejected: {e}"))?;
    mac.update(format!("POST\n{content_md5}\n{content_type}\n{date}\n{path}").as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
struct StationDayResponse {
    success: bool,
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    data: Option<Vec<DataPoint>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataPoint {
    /// Epoch milliseconds, sent as a string
    data_timestamp: Millis,
    power: f64,
    #[serde(default)]
    power_str: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Millis {
    Text(String),
    Number(i64),
}

impl Millis {
    fn value(&self) -> Result<i64> {
        match self {
            Self::Text(s) => s
                .trim()
                .parse()
                .with_context(|| format!("dataTimestamp {s:?} is not a number")),
            Self::Number(n) => Ok(*n),
        }
    }
}

impl StationDayResponse {
    fn into_series(self) -> Result<Option<LiveSeries>> {
        if !self.success || !matches!(self.code.as_str(), "0" | "") {
            anyhow::bail!("SolisCloud rejected request: code {}: {}", self.code, self.msg);
        }
        let points = match self.data {
            Some(points) if !points.is_empty() => points,
            _ => return Ok(None),
        };

        points
            .into_iter()
            .map(|p| {
                let ms = p.data_timestamp.value()?;
                let timestamp = DateTime::from_timestamp_millis(ms)
                    .with_context(|| format!("dataTimestamp {ms} out of range"))?
                    .naive_utc();
                let power_kw = match p.power_str.as_str() {
                    "W" => p.power / 1000.0,
                    "kW" | "" => p.power,
                    "MW" => p.power * 1000.0,
                    unit => anyhow::bail!("unknown SolisCloud power unit {unit:?}"),
                };
                Ok(GenerationReading::new(timestamp, power_kw))
            })
            .collect::<Result<LiveSeries>>()
            .map(Some)
    }
}
