//! Error types for scoreboard fetches

/// Result type alias for scoreboard operations
pub type Result<T> = std::result::Result<T, ScoreboardError>;

/// Reasons a scoreboard fetch produced no track.
///
/// [`ScoreboardError::UnexpectedData`] and [`ScoreboardError::InvalidUrl`]
/// point at a real problem. Every other kind is an ordinary transient failure
/// of the upstream.
#[derive(Debug, thiserror::Error)]
pub enum ScoreboardError {
    /// HTTP request failed (connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Scoreboard answered with a non-200 status
    #[error("Scoreboard returned status {0}")]
    Status(reqwest::StatusCode),

    /// Body was not JSON
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid scoreboard URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response carried no current track
    #[error("Response has no {0} payload")]
    MissingPayload(&'static str),

    /// Payload present but shaped in a way we do not understand
    #[error("Unexpected scoreboard data: {0}")]
    UnexpectedData(String),
}

impl ScoreboardError {
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedData(msg.into())
    }

    /// Whether the failure is routine upstream flakiness
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::UnexpectedData(_) | Self::InvalidUrl(_))
    }
}
