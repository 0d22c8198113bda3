use axum::http::StatusCode;
use thiserror::Error;

/// Why a submission did not produce download options. Every variant is
/// terminal for the request that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Invalid request method")]
    InvalidMethod,
    #[error("Invalid or missing security token")]
    InvalidToken,
    #[error("No video URL was provided")]
    EmptyUrl,
    #[error("URL is too long")]
    UrlTooLong,
    #[error("Invalid URL format")]
    MalformedUrl,
    #[error("Unsupported video platform")]
    UnsupportedDomain,
    #[error("Could not retrieve video details: {0}")]
    LookupFailed(String),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidMethod => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidToken => StatusCode::FORBIDDEN,
            Self::EmptyUrl | Self::UrlTooLong | Self::MalformedUrl | Self::UnsupportedDomain => {
                StatusCode::BAD_REQUEST
            }
            Self::LookupFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable identifier for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMethod => "INVALID_METHOD",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::EmptyUrl => "EMPTY_URL",
            Self::UrlTooLong => "URL_TOO_LONG",
            Self::MalformedUrl => "MALFORMED_URL",
            Self::UnsupportedDomain => "UNSUPPORTED_DOMAIN",
            Self::LookupFailed(_) => "LOOKUP_FAILED",
        }
    }
}

/// Failure outside the submission pipeline: startup, binding, serving.
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
