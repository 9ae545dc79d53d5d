//! Error classification for exception metrics
//!
//! The exception counter tags each failure with a stable error kind instead
//! of a type name, so the label set stays a small closed vocabulary no matter
//! what error types downstream handlers produce.

use std::convert::Infallible;
use std::fmt;

/// Stable classification of downstream faults.
///
/// These are the only values the `exception_type` label can take. Adding a
/// variant is an observable change for dashboards and alerts, so the set is
/// deliberately small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request or its payload was malformed.
    InvalidInput,
    /// The downstream call exceeded its own deadline.
    Timeout,
    /// The downstream call was cancelled before completing.
    Canceled,
    /// A dependency was unreachable or refused the connection.
    Unavailable,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// The label value recorded on the exception counter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an error into an [`ErrorKind`] for metric labeling.
///
/// Implement this for the error type your handlers return. Classification
/// happens exactly once per failed request; the middleware never inspects
/// the error beyond this call and returns it to the caller unchanged.
pub trait ClassifyError {
    /// The metric label category for this error.
    fn error_kind(&self) -> ErrorKind;
}

impl ClassifyError for Infallible {
    fn error_kind(&self) -> ErrorKind {
        match *self {}
    }
}

impl ClassifyError for std::io::Error {
    fn error_kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match self.kind() {
            Io::InvalidInput | Io::InvalidData => ErrorKind::InvalidInput,
            Io::TimedOut | Io::WouldBlock => ErrorKind::Timeout,
            Io::Interrupted => ErrorKind::Canceled,
            Io::ConnectionRefused | Io::ConnectionReset | Io::ConnectionAborted | Io::NotConnected => {
                ErrorKind::Unavailable
            }
            _ => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(ErrorKind::InvalidInput.as_str(), "invalid_input");
        assert_eq!(ErrorKind::Timeout.as_str(), "timeout");
        assert_eq!(ErrorKind::Canceled.as_str(), "canceled");
        assert_eq!(ErrorKind::Unavailable.as_str(), "unavailable");
        assert_eq!(ErrorKind::Internal.as_str(), "internal");
    }

    #[test]
    fn test_io_error_classification() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline");
        assert_eq!(err.error_kind(), ErrorKind::Timeout);

        let err = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad frame");
        assert_eq!(err.error_kind(), ErrorKind::InvalidInput);

        let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down");
        assert_eq!(err.error_kind(), ErrorKind::Unavailable);

        let err = std::io::Error::other("boom");
        assert_eq!(err.error_kind(), ErrorKind::Internal);
    }
}
