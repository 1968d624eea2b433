use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("No dataset published for {0}")]
    NotFound(i32),

    #[error("Invalid dataset for {year}: {reason}")]
    Parse { year: i32, reason: String },

    #[error("Year {0} is outside the supported range")]
    UnsupportedYear(i32),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Server(_))
    }

    /// The year is simply not available (as opposed to broken).
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_) | FetchError::UnsupportedYear(_))
    }

    pub fn parse(year: i32, reason: impl Into<String>) -> Self {
        FetchError::Parse {
            year,
            reason: reason.into(),
        }
    }

    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(year: i32, status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            404 => FetchError::NotFound(year),
            _ => FetchError::Server(format!("Status {}: {}", status, Self::truncate_body(body))),
        }
    }
}
