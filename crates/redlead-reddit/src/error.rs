use thiserror::Error;

/// Errors returned by the Reddit API client.
#[derive(Debug, Error)]
pub enum RedditError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response that is not covered by a more specific variant.
    #[error("Reddit returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP 429. `retry_after_secs` comes from `x-ratelimit-reset` when present.
    #[error("Reddit rate limit hit (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Token exchange failed: bad app credentials or an expired/revoked
    /// refresh token (`invalid_grant`).
    #[error("Reddit auth error: {0}")]
    Auth(String),

    /// Reddit accepted the request but reported an application error, e.g.
    /// `THREAD_LOCKED`, `DELETED_COMMENT` or `USER_DOESNT_EXIST`.
    #[error("Reddit API error {code}: {message}")]
    Api { code: String, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid Reddit URL: {0}")]
    InvalidUrl(String),
}

impl RedditError {
    /// Whether the same request may succeed later.
    ///
    /// Transient: timeouts, connection failures, 5xx, 429 and Reddit's own
    /// `RATELIMIT` application error. Everything else (auth, forbidden,
    /// locked or deleted targets, malformed responses) is permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Status { status, .. } => *status >= 500,
            Self::RateLimited { .. } => true,
            Self::Api { code, .. } => code == "RATELIMIT",
            Self::Auth(_) | Self::Deserialize { .. } | Self::InvalidUrl(_) => false,
        }
    }
}
