//! Classified error type for hlsrelay.
//!
//! Every orchestrator operation reports one of these variants so the HTTP
//! layer in front of it can tell a policy rejection from a capacity limit or
//! a transcoder that would not start. [`Error::http_status`] gives the status
//! code each outcome maps to.

use std::fmt;

/// Error type covering every reported outcome of hlsrelay operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transcoding is switched off in the active configuration.
    #[error("Transcoding disabled")]
    Disabled,

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The source host is not on the configured allow-list.
    #[error("Source host is not allowed: {0}")]
    HostNotAllowed(String),

    /// The concurrent job cap has been reached.
    #[error("Maximum concurrent jobs reached ({limit})")]
    Capacity {
        /// The effective cap at the time of the request.
        limit: usize,
    },

    /// The transcoder process could not be started.
    #[error("Failed to start transcoder: {0}")]
    Spawn(String),

    /// The public token is malformed or its signature does not verify.
    #[error("Invalid stream token")]
    InvalidToken,

    /// The requested job or file does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "file").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A job could not be registered or replaced in the registry.
    #[error("Failed to register job: {0}")]
    Registration(String),

    /// Another seek on the same job has not finished yet.
    #[error("Seek already in progress for job {0}")]
    SeekInProgress(String),

    /// Configuration could not be loaded or applied.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Disabled => 503,
            Error::Validation(_) => 400,
            Error::HostNotAllowed(_) => 403,
            Error::Capacity { .. } => 429,
            Error::Spawn(_) => 502,
            Error::InvalidToken => 400,
            Error::NotFound { .. } => 404,
            Error::Registration(_) => 500,
            Error::SeekInProgress(_) => 409,
            Error::Config(_) => 500,
            Error::Io(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Convenience constructor for [`Error::Spawn`].
    pub fn spawn<S: Into<String>>(msg: S) -> Self {
        Self::Spawn(msg.into())
    }

    /// Convenience constructor for [`Error::Registration`].
    pub fn registration<S: Into<String>>(msg: S) -> Self {
        Self::Registration(msg.into())
    }

    /// Convenience constructor for [`Error::Config`].
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// [`Error::NotFound`] for a job id.
    pub fn job_not_found(id: impl fmt::Display) -> Self {
        Self::not_found("job", id)
    }

    /// True when the error means the job (or file) is gone rather than the
    /// request being wrong.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Disabled.to_string(), "Transcoding disabled");

        let err = Error::validation("Only http/https URLs are allowed");
        assert_eq!(
            err.to_string(),
            "Validation error: Only http/https URLs are allowed"
        );

        let err = Error::Capacity { limit: 3 };
        assert_eq!(err.to_string(), "Maximum concurrent jobs reached (3)");

        let err = Error::job_not_found("abc");
        assert_eq!(err.to_string(), "job not found: abc");

        assert_eq!(Error::InvalidToken.to_string(), "Invalid stream token");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(Error::Disabled.http_status(), 503);
        assert_eq!(Error::validation("x").http_status(), 400);
        assert_eq!(Error::HostNotAllowed("evil.test".into()).http_status(), 403);
        assert_eq!(Error::Capacity { limit: 1 }.http_status(), 429);
        assert_eq!(Error::spawn("no such file").http_status(), 502);
        assert_eq!(Error::InvalidToken.http_status(), 400);
        assert_eq!(Error::job_not_found("x").http_status(), 404);
        assert_eq!(Error::registration("x").http_status(), 500);
        assert_eq!(Error::SeekInProgress("x".into()).http_status(), 409);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::not_found("file", "index.m3u8").is_not_found());
        assert!(!Error::InvalidToken.is_not_found());
    }
}
