use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::forecast::{EngineTimeouts, IrradianceModel, OpenMeteoConfig};
use crate::hardware::{EnphaseConfig, SolisConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub nwp: NwpConfig,
    pub inverters: InvertersConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NwpConfig {
    pub forecast_base_url: String,
    pub archive_base_url: String,
    /// Responses are kept in memory only when unset
    pub cache_dir: Option<PathBuf>,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub http_timeout_seconds: u64,
    /// Upper bound for the whole retrieval, retries included
    pub fetch_timeout_seconds: u64,
}

impl Default for NwpConfig {
    fn default() -> Self {
        let client = OpenMeteoConfig::default();
        Self {
            forecast_base_url: client.forecast_base_url,
            archive_base_url: client.archive_base_url,
            cache_dir: None,
            max_retries: client.max_retries,
            backoff_base_ms: client.backoff_base.as_millis() as u64,
            http_timeout_seconds: client.http_timeout.as_secs(),
            fetch_timeout_seconds: 60,
        }
    }
}

impl NwpConfig {
    pub fn client_config(&self) -> OpenMeteoConfig {
        OpenMeteoConfig {
            forecast_base_url: self.forecast_base_url.clone(),
            archive_base_url: self.archive_base_url.clone(),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            http_timeout: Duration::from_secs(self.http_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvertersConfig {
    pub telemetry_timeout_seconds: u64,
    pub enphase: EnphaseSettings,
    pub solis: SolisSettings,
}

impl Default for InvertersConfig {
    fn default() -> Self {
        Self {
            telemetry_timeout_seconds: 20,
            enphase: EnphaseSettings::default(),
            solis: SolisSettings::default(),
        }
    }
}

/// Enphase credentials. The client is only built when `api_key` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnphaseSettings {
    pub base_url: String,
    #[serde(deserialize_with = "string_or_number")]
    pub api_key: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub access_token: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub system_id: Option<String>,
}

impl Default for EnphaseSettings {
    fn default() -> Self {
        Self {
            base_url: EnphaseConfig::default().base_url,
            api_key: None,
            access_token: None,
            system_id: None,
        }
    }
}

impl EnphaseSettings {
    pub fn client_config(&self) -> Option<EnphaseConfig> {
        let api_key = self.api_key.clone().filter(|k| !k.is_empty())?;
        Some(EnphaseConfig {
            base_url: self.base_url.clone(),
            api_key,
            access_token: self.access_token.clone(),
            ..EnphaseConfig::default()
        })
    }
}

/// SolisCloud credentials. The client is only built when all three are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolisSettings {
    pub base_url: String,
    #[serde(deserialize_with = "string_or_number")]
    pub key_id: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub key_secret: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub station_id: Option<String>,
}

impl Default for SolisSettings {
    fn default() -> Self {
        Self {
            base_url: SolisConfig::default().base_url,
            key_id: None,
            key_secret: None,
            station_id: None,
        }
    }
}

impl SolisSettings {
    pub fn client_config(&self) -> Option<SolisConfig> {
        let set = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        Some(SolisConfig {
            base_url: self.base_url.clone(),
            key_id: set(&self.key_id)?,
            key_secret: set(&self.key_secret)?,
            station_id: set(&self.station_id)?,
            ..SolisConfig::default()
        })
    }
}

/// Ids and keys are text even when they look numeric (`system_id = 4123456`)
fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        UInt(u64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(de)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::UInt(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    }))
}

/// Inverter credentials read verbatim from the environment
const CREDENTIAL_KEYS: &[(&str, &str)] = &[
    ("enphase", "api_key"),
    ("enphase", "access_token"),
    ("enphase", "system_id"),
    ("solis", "key_id"),
    ("solis", "key_secret"),
    ("solis", "station_id"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub horizon_hours: u32,
    pub performance_ratio: f64,
    pub live_blend_hours: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let model = IrradianceModel::default();
        Self {
            horizon_hours: model.horizon_hours,
            performance_ratio: model.performance_ratio,
            live_blend_hours: model.live_blend_hours,
        }
    }
}

impl ModelConfig {
    pub fn build(&self) -> IrradianceModel {
        IrradianceModel {
            horizon_hours: self.horizon_hours,
            performance_ratio: self.performance_ratio,
            live_blend_hours: self.live_blend_hours,
        }
    }
}

impl Config {
    /// Defaults, then `config/default.toml`, then `SOLAR__*` variables
    /// (a `.env` file is read first when present).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self::figment(Toml::file("config/default.toml")).extract()?)
    }

    fn figment(file: impl Provider) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("SOLAR__").split("__"));

        // Env parses values, so "0123" would lose its leading zero
        for (section, key) in CREDENTIAL_KEYS {
            let var = format!(
                "SOLAR__INVERTERS__{}__{}",
                section.to_uppercase(),
                key.to_uppercase()
            );
            if let Ok(raw) = std::env::var(&var) {
                figment = figment.merge(Serialized::default(
                    &format!("inverters.{section}.{key}"),
                    raw,
                ));
            }
        }
        figment
    }

    pub fn engine_timeouts(&self) -> EngineTimeouts {
        EngineTimeouts {
            nwp: Duration::from_secs(self.nwp.fetch_timeout_seconds),
            telemetry: Duration::from_secs(self.inverters.telemetry_timeout_seconds),
        }
    }
}
