//! Error taxonomy for the session/cache core.
//!
//! None of these errors is fatal: a `DecodeError` degrades to "logged out",
//! an `AuthError` leaves the stored session untouched, and a
//! `CacheError::Load` is never cached so the next read retries.

use std::sync::Arc;

use thiserror::Error;

/// The persisted session blob could not be decoded.
#[derive(Error, Debug)]
#[error("Corrupt session data: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Username and password required")]
    MissingCredentials,

    #[error("Invalid credentials for {0}")]
    InvalidCredentials(String),

    #[error("Authentication service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The loader failed. Every caller that was coalesced onto the same
    /// in-flight load receives a clone sharing the same `cause`.
    #[error("Failed to load {key}: {cause:#}")]
    Load {
        key: String,
        cause: Arc<anyhow::Error>,
    },
}

impl CacheError {
    pub fn key(&self) -> &str {
        match self {
            CacheError::Load { key, .. } => key,
        }
    }

    /// The underlying loader error.
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            CacheError::Load { cause, .. } => cause,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error("Session storage failed: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Profile hydration failed: {0:#}")]
    Hydration(#[source] anyhow::Error),

    /// The user logged out or logged in again before the profile arrived.
    #[error("Session changed before profile hydration finished")]
    Superseded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_clones_share_cause() {
        let err = CacheError::Load {
            key: "stats".to_string(),
            cause: Arc::new(anyhow::anyhow!("connection reset")),
        };
        let copy = err.clone();

        match (&err, &copy) {
            (CacheError::Load { cause: a, .. }, CacheError::Load { cause: b, .. }) => {
                assert!(Arc::ptr_eq(a, b));
            }
        }
        assert_eq!(copy.key(), "stats");
        assert_eq!(err.to_string(), "Failed to load stats: connection reset");
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::InvalidCredentials("admin".to_string()).to_string(),
            "Invalid credentials for admin"
        );
    }
}
