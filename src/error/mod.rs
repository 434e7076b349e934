use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortfolioError>;

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Solana RPC error for {address}: {message}")]
    Rpc { message: String, address: String },

    #[error("Failed to parse ledger response for {address}: {message}")]
    Parse { message: String, address: String },

    #[error("Upstream batch failed for [{identifiers}]: {message}")]
    UpstreamBatch {
        message: String,
        identifiers: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Upstream HTTP error: {status} - {message}")]
    Http {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job queue error: {0}")]
    Queue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortfolioError {
    pub fn rpc(message: impl Into<String>, address: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
            address: address.into(),
        }
    }

    pub fn parse(message: impl Into<String>, address: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            address: address.into(),
        }
    }

    /// Wraps a batch failure with the identifiers that were being resolved.
    pub fn upstream_batch(message: impl Into<String>, identifiers: &[String]) -> Self {
        Self::UpstreamBatch {
            message: message.into(),
            identifiers: identifiers.join(", "),
        }
    }

    /// Backoff hint carried by a throttled upstream response, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Http {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_batch_joins_identifiers() {
        let err = PortfolioError::upstream_batch(
            "exhausted retries",
            &["mint1".to_string(), "mint2".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "Upstream batch failed for [mint1, mint2]: exhausted retries"
        );
    }

    #[test]
    fn test_retry_after_only_on_http() {
        let throttled = PortfolioError::Http {
            status: 429,
            message: "too many requests".to_string(),
            retry_after_secs: Some(7),
        };
        assert_eq!(throttled.retry_after(), Some(7));

        let other = PortfolioError::Queue("worker gone".to_string());
        assert_eq!(other.retry_after(), None);
    }
}
