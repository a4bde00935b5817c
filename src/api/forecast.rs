use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::{
    api::{error::ApiError, AppState},
    domain::Site,
    forecast::{resolve_timestamp, ForecastRequest, ForecastResponse},
    hardware::TelemetryOverrides,
};

fn default_nwp_source() -> String {
    "icon".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForecastRequestBody {
    #[validate(nested)]
    pub site: Site,
    /// ISO-8601; defaults to now
    pub timestamp: Option<String>,
    #[serde(default = "default_nwp_source")]
    pub nwp_source: String,
    pub access_token: Option<String>,
    pub enphase_system_id: Option<String>,
}

/// POST /api/v1/forecast
pub async fn create_forecast(
    State(st): State<AppState>,
    Json(body): Json<ForecastRequestBody>,
) -> Result<Json<ForecastResponse>, ApiError> {
    body.validate()?;

    let ts = resolve_timestamp(body.timestamp.as_deref(), st.clock.now())?;
    let request = ForecastRequest {
        site: body.site,
        ts,
        nwp_source: body.nwp_source,
        overrides: TelemetryOverrides {
            enphase_system_id: body.enphase_system_id,
            access_token: body.access_token,
        },
    };

    tracing::info!(
        latitude = request.site.latitude,
        longitude = request.site.longitude,
        inverter = %request.site.inverter_type,
        source = %request.nwp_source,
        %ts,
        "forecast requested"
    );

    let cancel = st.shutdown.child_token();
    let response = st.engine.forecast(&request, &cancel).await?;
    Ok(Json(response))
}
