use thiserror::Error;

pub type Result<T, E = DataError> = std::result::Result<T, E>;

pub const UNAUTHORIZED: u16 = 401;

/// Failures surfaced by the API client, the favorites store and the
/// repository on top of them. Nothing in this crate swallows these.
#[derive(Debug, Error)]
pub enum DataError {
    /// No connectivity, DNS failure, timeout. The user may retry.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The catalog answered with a non-2xx status. 401 means the API key is
    /// missing or rejected.
    #[error("TMDB API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The body did not match the documented schema.
    #[error("failed to parse response from {endpoint}: {source}")]
    Parse {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("favorites storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl DataError {
    pub fn missing_api_key() -> Self {
        DataError::Api {
            status: UNAUTHORIZED,
            message: "no TMDB API key configured".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DataError::Network(_) | DataError::Storage(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            DataError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(UNAUTHORIZED)
    }
}
