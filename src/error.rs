//! Central error type for the monitor-and-control client.
//!
//! Every fallible path in the crate returns [`McError`]. Remote-call failures
//! are converted at the proxy boundary into `Communication` (transport) or
//! `Remote` (the supervisor raised an error); the dispatcher converts both
//! into non-fatal apply outcomes so raw transport errors never reach the
//! presentation layer. `KeyNotFound` and `KeyInconsistency` mirror the two
//! cache/layout failure modes: a value that was never populated, and a key
//! set whose depths cannot be reconciled into one column grid.

use thiserror::Error;

/// Convenience alias for results using the client error type.
pub type McResult<T> = std::result::Result<T, McError>;

#[derive(Error, Debug)]
pub enum McError {
    #[error("communication error: {0}")]
    Communication(String),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("malformed response payload: {0}")]
    Payload(String),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no cached value at {0}")]
    KeyNotFound(String),

    #[error("inconsistent key depths: {0}")]
    KeyInconsistency(String),

    #[error("board name '{0}' does not end in a 1-based index digit")]
    BoardName(String),

    #[error("invalid request: {0}")]
    Request(String),
}

impl McError {
    /// True for the error kinds produced by a failed remote call.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            McError::Communication(_) | McError::Remote(_) | McError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_are_classified() {
        assert!(McError::Communication("down".into()).is_remote_failure());
        assert!(McError::Remote("KeyError".into()).is_remote_failure());
        assert!(!McError::KeyNotFound("roach1/0/0".into()).is_remote_failure());
    }

    #[test]
    fn io_errors_convert() {
        let err: McError = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope").into();
        assert!(err.is_remote_failure());
    }
}
