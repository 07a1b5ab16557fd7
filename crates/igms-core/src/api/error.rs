use reqwest::StatusCode;
use thiserror::Error;

use crate::utils::truncate_string;

/// Characters of a backend error body kept in the message
const MAX_DETAIL_CHARS: usize = 200;

/// Failures of the REST statistics backend.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Statistics backend did not accept the session ({status})")]
    SessionRejected { status: u16 },

    #[error("No statistics recorded for department '{department}'")]
    UnknownDepartment { department: String },

    #[error("Statistics query rejected: {0}")]
    InvalidQuery(String),

    #[error("Statistics backend still rate limiting after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Statistics backend unavailable ({status}): {detail}")]
    Unavailable { status: u16, detail: String },

    #[error("Unexpected statistics response ({status}): {detail}")]
    Unexpected { status: u16, detail: String },

    #[error("Statistics request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Map a non-success, non-429 response for a lookup of `department`.
    pub fn from_status(status: StatusCode, department: &str, body: &str) -> Self {
        let detail = truncate_string(body.trim(), MAX_DETAIL_CHARS);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::SessionRejected {
                status: status.as_u16(),
            },
            StatusCode::NOT_FOUND => ApiError::UnknownDepartment {
                department: department.to_string(),
            },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::InvalidQuery(detail),
            s if s.is_server_error() => ApiError::Unavailable {
                status: s.as_u16(),
                detail,
            },
            s => ApiError::Unexpected {
                status: s.as_u16(),
                detail,
            },
        }
    }
}
