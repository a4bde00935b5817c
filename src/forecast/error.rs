use thiserror::Error;

/// Failures on the weather path. All of them abort the forecast request.
#[derive(Debug, Error)]
pub enum NwpError {
    #[error("Source ({0}) must be either \"icon\" or \"gfs\"")]
    InvalidSource(String),
    #[error("NWP provider unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("NWP provider returned no hourly data")]
    EmptyData,
    #[error("Malformed NWP response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest_middleware::Error> for NwpError {
    fn from(error: reqwest_middleware::Error) -> Self {
        NwpError::UpstreamUnavailable(error.to_string())
    }
}

impl From<reqwest::Error> for NwpError {
    fn from(error: reqwest::Error) -> Self {
        NwpError::UpstreamUnavailable(error.to_string())
    }
}
