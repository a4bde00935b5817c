//! Live inverter telemetry
//!
//! Each supported inverter brand is one [`TelemetryAdapter`] variant behind
//! the [`LiveGenerationSource`] capability. Adapters never fail a forecast:
//! missing configuration and provider errors come back as a
//! [`TelemetryUnavailable`] reason for the caller to log.

pub mod enphase;
pub mod factory;
pub mod solis;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{InverterType, LiveSeries, Site};

pub use enphase::{EnphaseApi, EnphaseClient, EnphaseConfig};
pub use factory::{TelemetryFactory, TelemetryOverrides};
pub use solis::{SolisApi, SolisClient, SolisConfig};

/// Why no live series is available for a site
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryUnavailable {
    #[error("no inverter configured")]
    NoInverter,
    #[error("Enphase system id is not provided")]
    MissingSystemId,
    #[error("{0} telemetry client is not configured")]
    NotConfigured(InverterType),
    #[error("unsupported inverter type: {0}")]
    Unsupported(String),
    #[error("failed to retrieve {provider} inverter data: {reason}")]
    FetchFailed {
        provider: InverterType,
        reason: String,
    },
    #[error("{0} telemetry fetch timed out")]
    Timeout(InverterType),
    #[error("{0} returned no readings")]
    Empty(InverterType),
}

#[async_trait]
pub trait LiveGenerationSource: Send + Sync {
    async fn fetch_live_generation(&self, site: &Site) -> Result<LiveSeries, TelemetryUnavailable>;
}

/// Adapter for one inverter brand, built by [`TelemetryFactory`]
pub enum TelemetryAdapter {
    None,
    Enphase(EnphaseAdapter),
    Solis(SolisAdapter),
    Unsupported(String),
}

impl TelemetryAdapter {
    pub fn inverter_type(&self) -> InverterType {
        match self {
            Self::None => InverterType::None,
            Self::Enphase(_) => InverterType::Enphase,
            Self::Solis(_) => InverterType::Solis,
            Self::Unsupported(name) => InverterType::Other(name.clone()),
        }
    }
}

#[async_trait]
impl LiveGenerationSource for TelemetryAdapter {
    async fn fetch_live_generation(&self, site: &Site) -> Result<LiveSeries, TelemetryUnavailable> {
        match self {
            Self::None => Err(TelemetryUnavailable::NoInverter),
            Self::Enphase(adapter) => adapter.fetch().await,
            Self::Solis(adapter) => adapter.fetch().await,
            Self::Unsupported(name) => {
                tracing::debug!(inverter = %name, latitude = site.latitude, "no adapter for inverter");
                Err(TelemetryUnavailable::Unsupported(name.clone()))
            }
        }
    }
}

/// Enphase telemetry, keyed by a system id resolved outside this crate
pub struct EnphaseAdapter {
    pub(crate) api: Option<Arc<dyn EnphaseApi>>,
    pub(crate) system_id: Option<String>,
    pub(crate) access_token: Option<String>,
}

impl EnphaseAdapter {
    async fn fetch(&self) -> Result<LiveSeries, TelemetryUnavailable> {
        let Some(system_id) = self.system_id.as_deref().filter(|id| !id.is_empty()) else {
            return Err(TelemetryUnavailable::MissingSystemId);
        };
        let Some(api) = &self.api else {
            return Err(TelemetryUnavailable::NotConfigured(InverterType::Enphase));
        };

        api.fetch_generation(system_id, self.access_token.clone())
            .await
            .map_err(|e| TelemetryUnavailable::FetchFailed {
                provider: InverterType::Enphase,
                reason: format!("{e:#}"),
            })
    }
}

/// Solis telemetry; the client is configuration-driven and takes no site id
pub struct SolisAdapter {
    pub(crate) api: Option<Arc<dyn SolisApi>>,
}

impl SolisAdapter {
    async fn fetch(&self) -> Result<LiveSeries, TelemetryUnavailable> {
        let Some(api) = &self.api else {
            return Err(TelemetryUnavailable::NotConfigured(InverterType::Solis));
        };

        match api.fetch_generation().await {
            Ok(Some(series)) => Ok(series),
            Ok(None) => Err(TelemetryUnavailable::FetchFailed {
                provider: InverterType::Solis,
                reason: "provider returned no data".to_string(),
            }),
            Err(e) => Err(TelemetryUnavailable::FetchFailed {
                provider: InverterType::Solis,
                reason: format!("{e:#}"),
            }),
        }
    }
}
