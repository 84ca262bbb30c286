use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("OpenAI returned no message content")]
    EmptyResponse,

    /// The model answered, but not with the JSON shape we asked for.
    /// `raw` holds the start of the answer for the lead's error record.
    #[error("unparseable LLM response: {reason}; raw: {raw}")]
    Parse { reason: String, raw: String },
}

impl AiError {
    /// Timeouts, connection failures, 429 and 5xx.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyResponse | Self::Parse { .. } => false,
        }
    }
}
