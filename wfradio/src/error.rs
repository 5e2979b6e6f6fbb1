//! Error types for the Wildflower Radio client

use crate::segment_address::AddressError;

/// Result type alias for Wildflower Radio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching positions or driving playback
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// API returned an error status
    #[error("API error: {0}")]
    ApiError(String),

    /// A station entry violated the snapshot invariants
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Station absent from the position snapshot
    #[error("Station not found: {0}")]
    StationNotFound(String),

    /// Segment address could not be parsed or derived
    #[error("Segment address error: {0}")]
    Address(#[from] AddressError),

    /// Regex error
    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    /// A playback handle refused a source or command
    #[error("Playback error: {0}")]
    Playback(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an API error
    pub fn api_error(msg: impl Into<String>) -> Self {
        Self::ApiError(msg.into())
    }

    /// Create a playback error
    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback(msg.into())
    }

    /// Whether this error means "the position source told us nothing new"
    ///
    /// These are recovered by skipping the poll cycle.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Json(_) | Self::ApiError(_) | Self::InvalidUrl(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(Error::api_error("API returned status: 503").is_network());
        assert!(!Error::StationNotFound("Hue Jazz".into()).is_network());
        assert!(!Error::playback("device gone").is_network());

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(Error::from(json_err).is_network());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::StationNotFound("Legion Lofi".into()).to_string(),
            "Station not found: Legion Lofi"
        );
    }
}
