//! Unified error type for award-scout.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Browser capture failed: {0}")]
    Browser(String),

    #[error("Carrier API error (status={status}): {snippet}")]
    CarrierApi { status: u16, snippet: String },

    #[error("Payload parse error: {0}")]
    Payload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Circuit breaker tripped after {consecutive} consecutive failures")]
    CircuitBreaker { consecutive: usize },

    #[error("No reward availability found for any route")]
    NoData,

    #[error("No valid month requests could be planned")]
    NothingPlanned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Truncate a response body into a loggable failure reason.
    pub fn body_snippet(body: &str) -> String {
        const MAX: usize = 200;
        let trimmed = body.trim();
        if trimmed.len() <= MAX {
            trimmed.to_string()
        } else {
            let mut end = MAX;
            while !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &trimmed[..end])
        }
    }
}
