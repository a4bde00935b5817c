use std::sync::Arc;

use super::{EnphaseAdapter, EnphaseApi, SolisAdapter, SolisApi, TelemetryAdapter};
use crate::domain::InverterType;

/// Per-request credentials that take precedence over configuration
#[derive(Debug, Clone, Default)]
pub struct TelemetryOverrides {
    pub enphase_system_id: Option<String>,
    pub access_token: Option<String>,
}

/// Builds the telemetry adapter for a site's inverter type.
///
/// Holds the process-wide provider clients; a provider without a client
/// still gets an adapter, which reports itself as not configured.
#[derive(Default, Clone)]
pub struct TelemetryFactory {
    enphase: Option<Arc<dyn EnphaseApi>>,
    enphase_system_id: Option<String>,
    solis: Option<Arc<dyn SolisApi>>,
}

impl TelemetryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enphase(mut self, api: Arc<dyn EnphaseApi>, system_id: Option<String>) -> Self {
        self.enphase = Some(api);
        self.enphase_system_id = system_id;
        self
    }

    pub fn with_solis(mut self, api: Arc<dyn SolisApi>) -> Self {
        self.solis = Some(api);
        self
    }

    pub fn adapter_for(
        &self,
        inverter_type: &InverterType,
        overrides: &TelemetryOverrides,
    ) -> TelemetryAdapter {
        match inverter_type {
            InverterType::None => TelemetryAdapter::None,
            InverterType::Enphase => TelemetryAdapter::Enphase(EnphaseAdapter {
                api: self.enphase.clone(),
                system_id: overrides
                    .enphase_system_id
                    .clone()
                    .or_else(|| self.enphase_system_id.clone()),
                access_token: overrides.access_token.clone(),
            }),
            InverterType::Solis => TelemetryAdapter::Solis(SolisAdapter {
                api: self.solis.clone(),
            }),
            InverterType::Other(name) => TelemetryAdapter::Unsupported(name.clone()),
        }
    }
}
