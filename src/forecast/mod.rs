pub mod cache;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod model;
pub mod pv;
pub mod weather;

pub use cache::{DiskCache, MemoryCache, ResponseCache};
pub use dataset::{normalize, HourlyWeatherTable, WeatherDataset, WeatherFrame};
pub use engine::{
    resolve_timestamp, EngineTimeouts, ForecastEngine, ForecastError, ForecastRequest,
    ForecastResponse,
};
pub use error::NwpError;
pub use model::{ForecastModel, IrradianceModel};
pub use pv::{harmonize, GenerationDataset, GenerationFrame};
pub use weather::{
    Clock, FixedClock, NwpEndpoint, NwpProvider, NwpSource, OpenMeteoClient, OpenMeteoConfig,
    SystemClock,
};
