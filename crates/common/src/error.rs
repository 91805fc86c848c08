use std::time::Duration;

use thiserror::Error;

/// Failure reported by a chat transport for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// `retry_after` is the server's wait hint, absent when none was sent.
    #[error("Rate limited{}", .retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("Chat API error: {0}")]
    Api(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl DeliveryError {
    /// Server-supplied wait before the next attempt, when the platform sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DeliveryError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Common error types used across the lookout crates.
#[derive(Debug, Error)]
pub enum LookoutError {
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Inconsistent tracking state: {tracked} active items exceeds limit of {limit}")]
    InconsistentState { tracked: usize, limit: usize },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LookoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = DeliveryError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(limited.to_string(), "Rate limited, retry after 7s");

        let unhinted = DeliveryError::RateLimited { retry_after: None };
        assert_eq!(unhinted.retry_after(), None);
        assert_eq!(unhinted.to_string(), "Rate limited");
        assert_eq!(DeliveryError::Api("channel_not_found".into()).retry_after(), None);
        assert_eq!(DeliveryError::Transport("reset".into()).retry_after(), None);
    }

    #[test]
    fn test_delivery_error_converts() {
        let err: LookoutError = DeliveryError::Api("invalid_auth".into()).into();
        assert!(matches!(err, LookoutError::Delivery(DeliveryError::Api(_))));
        assert_eq!(err.to_string(), "Delivery failed: Chat API error: invalid_auth");
    }
}
