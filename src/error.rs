use reqwest::StatusCode;
use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} env var must be set")]
    Missing(&'static str),
    #[error("{0} env var must not be empty")]
    Empty(&'static str),
    #[error("invalid {var} value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Failures talking to the cluster API, the token endpoint or the telemetry backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode {service} response: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
    #[error("credentials: {0}")]
    Credentials(String),
    #[error("{0}")]
    InvalidInput(String),
}

impl ApiError {
    /// Rate limits, server errors and network failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            ApiError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || status.is_server_error()
            }
            ApiError::Decode { .. } | ApiError::Credentials(_) | ApiError::InvalidInput(_) => false,
        }
    }

    pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> ApiError {
        move |source| ApiError::Transport { service, source }
    }

    /// For errors from reading a response body: a dropped or stalled body is a
    /// network failure, anything else is a bad payload.
    pub(crate) fn body(service: &'static str) -> impl FnOnce(reqwest::Error) -> ApiError {
        move |source| {
            if source.is_body() || source.is_timeout() {
                ApiError::Transport { service, source }
            } else {
                ApiError::Decode {
                    service,
                    reason: source.to_string(),
                }
            }
        }
    }
}

/// Classifies errors for [`crate::retry::retry`].
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for ApiError {
    fn is_transient(&self) -> bool {
        ApiError::is_transient(self)
    }
}
