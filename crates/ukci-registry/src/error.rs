use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

/// The client answers 404 with "absent" before this is consulted, so every status that
/// reaches here is handed back to the task layer for another attempt.
pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status == StatusCode::NOT_FOUND {
        RetryDisposition::NonRetryable
    } else {
        RetryDisposition::Retryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Failures surfaced by the registry client.
///
/// "Not found" is deliberately absent: a missing company is `Ok(None)` and a missing
/// list is an empty `Vec`.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("COMPANIES_HOUSE_API_KEY is not configured")]
    MissingApiKey,
    #[error("rate limit wait exceeded after {waited:?}")]
    RateLimited { waited: Duration },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("malformed registry payload: {0}")]
    Decode(String),
    #[error("building http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("injected failure: {0}")]
    Injected(String),
}

impl RegistryError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Injected(_) => {
                RetryDisposition::Retryable
            }
            Self::Transport { source, .. } => classify_reqwest_error(source),
            Self::Status { status, .. } => StatusCode::from_u16(*status)
                .map(classify_status)
                .unwrap_or(RetryDisposition::Retryable),
            Self::MissingApiKey | Self::Decode(_) | Self::Build(_) => {
                RetryDisposition::NonRetryable
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() == RetryDisposition::Retryable
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingApiKey | Self::Build(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_http_error_status_is_retryable() {
        for status in [400, 401, 403, 408, 410, 422, 429, 500, 502, 503] {
            let err = RegistryError::Status {
                status,
                url: "https://example.test/company/1".into(),
            };
            assert!(err.is_retryable(), "status {status}");
        }
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn configuration_and_decode_errors_are_terminal() {
        assert!(RegistryError::Timeout { url: "x".into() }.is_retryable());
        assert!(!RegistryError::MissingApiKey.is_retryable());
        assert!(RegistryError::MissingApiKey.is_configuration());
        assert!(!RegistryError::Decode("bad json".into()).is_retryable());
        assert!(RegistryError::RateLimited {
            waited: Duration::from_secs(600)
        }
        .is_retryable());
    }
}
