use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

pub const DEFAULT_TILT_DEG: f64 = 35.0;
pub const DEFAULT_ORIENTATION_DEG: f64 = 180.0;

/// Inverter brand a site reports live generation through.
///
/// Unrecognised names are kept as `Other` so the request still takes the
/// live-data path, where the adapter reports them as unsupported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum InverterType {
    #[default]
    None,
    Enphase,
    Solis,
    Other(String),
}

impl InverterType {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for InverterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Enphase => write!(f, "enphase"),
            Self::Solis => write!(f, "solis"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for InverterType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "" | "none" => Self::None,
            "enphase" => Self::Enphase,
            "solis" => Self::Solis,
            _ => Self::Other(trimmed.to_string()),
        })
    }
}

impl From<Option<String>> for InverterType {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => s.parse().unwrap_or_default(),
            None => Self::None,
        }
    }
}

impl From<InverterType> for Option<String> {
    fn from(value: InverterType) -> Self {
        match value {
            InverterType::None => None,
            other => Some(other.to_string()),
        }
    }
}

/// PV site descriptor. Immutable for the lifetime of one forecast request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Site {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// Nameplate DC capacity (kWp)
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_kwp: f64,
    /// Panel tilt from horizontal (degrees)
    #[serde(default = "default_tilt")]
    #[validate(range(min = 0.0, max = 90.0))]
    pub tilt: f64,
    /// Panel azimuth, 180 = south (degrees)
    #[serde(default = "default_orientation")]
    #[validate(range(min = 0.0, max = 360.0))]
    pub orientation: f64,
    #[serde(default)]
    pub inverter_type: InverterType,
}

fn default_tilt() -> f64 {
    DEFAULT_TILT_DEG
}

fn default_orientation() -> f64 {
    DEFAULT_ORIENTATION_DEG
}

impl Site {
    /// Site with default tilt and orientation and no inverter
    pub fn new(latitude: f64, longitude: f64, capacity_kwp: f64) -> Self {
        Self {
            latitude,
            longitude,
            capacity_kwp,
            tilt: DEFAULT_TILT_DEG,
            orientation: DEFAULT_ORIENTATION_DEG,
            inverter_type: InverterType::None,
        }
    }

    /// Same site reporting live data through `inverter_type`
    pub fn with_inverter(mut self, inverter_type: InverterType) -> Self {
        self.inverter_type = inverter_type;
        self
    }

    /// Override panel tilt and azimuth (degrees)
    pub fn with_orientation(mut self, tilt: f64, orientation: f64) -> Self {
        self.tilt = tilt;
        self.orientation = orientation;
        self
    }

    /// Same site with the inverter stripped, used for the no-live-data run
    pub fn without_inverter(&self) -> Self {
        Self {
            inverter_type: InverterType::None,
            ..self.clone()
        }
    }

    /// True unless the inverter type is [`InverterType::None`]
    pub fn has_inverter(&self) -> bool {
        !self.inverter_type.is_none()
    }
}
