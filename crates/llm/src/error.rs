use std::time::Duration;

use thiserror::Error;

/// Failure of one generation call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error (status {status}): {body}")]
    Server { status: u16, body: String },
    #[error("request rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl GenerationError {
    /// Rate limits, timeouts, connection failures and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout | Self::Transport(_) | Self::Server { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Maps a non-success HTTP status to its error class.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited {
                message: body,
                retry_after,
            },
            408 => Self::Timeout,
            500..=599 => Self::Server { status, body },
            _ => Self::Rejected { status, body },
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string(), None)
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert!(GenerationError::from_status(429, String::new(), None).is_retryable());
        assert!(GenerationError::from_status(503, String::new(), None).is_retryable());
        assert!(GenerationError::from_status(408, String::new(), None).is_retryable());
        assert!(!GenerationError::from_status(401, String::new(), None).is_retryable());
        assert!(!GenerationError::from_status(400, String::new(), None).is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!GenerationError::Malformed("x".into()).is_retryable());
        assert!(!GenerationError::Config("x".into()).is_retryable());
        assert!(GenerationError::Transport("refused".into()).is_retryable());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let err = GenerationError::from_status(429, "slow down".into(), Some(Duration::from_secs(4)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
        assert_eq!(err.to_string(), "rate limited: slow down");
        assert_eq!(GenerationError::Timeout.retry_after(), None);
    }
}
