//! Error types for rigrelay.
//!
//! Fallible library operations (line I/O, configuration loading, backend
//! setup) return [`Result<T>`], which uses [`Error`] as the error type.
//!
//! Radio state transitions are deliberately *not* errors: they return an
//! [`Outcome`](crate::types::Outcome), because "disabled" and "blocked" are
//! expected answers to a control request rather than failures.

/// The error type for all fallible rigrelay operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The I/O controller rejected a line request, write, or read.
    #[error("line error: {0}")]
    Line(String),

    /// The configuration file could not be parsed.
    ///
    /// `line` is the 1-based line number in the source text.
    #[error("config error at line {line}: {message}")]
    Config {
        /// 1-based line number of the offending input.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    /// An invalid parameter was passed to an operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested operation or backend is not available in this build.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The I/O controller has been closed.
    #[error("not connected")]
    NotConnected,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_line() {
        let e = Error::Line("gpiochip0 line 17 busy".into());
        assert_eq!(e.to_string(), "line error: gpiochip0 line 17 busy");
    }

    #[test]
    fn error_display_config() {
        let e = Error::Config {
            line: 12,
            message: "missing '='".into(),
        };
        assert_eq!(e.to_string(), "config error at line 12: missing '='");
    }

    #[test]
    fn error_display_invalid_parameter() {
        let e = Error::InvalidParameter("pin 400 out of range".into());
        assert_eq!(e.to_string(), "invalid parameter: pin 400 out of range");
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("gpiod backend".into());
        assert_eq!(e.to_string(), "unsupported operation: gpiod backend");
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("no such device"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
