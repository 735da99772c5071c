//! Custom error types for the application.
//!
//! This module defines the primary error type, `LoggerError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized way to describe what can
//! go wrong while configuring a session, talking to the sensor endpoint, or writing
//! readings to disk.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while layering the TOML file and
//!   environment overrides.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine but
//!   makes no sense (e.g. both sinks disabled). Returned by `LoggerConfig::validate`
//!   and by `Session::start` when no sink is enabled.
//! - **`Io`**: Wraps `std::io::Error` for file system work around the sinks.
//! - **`Csv`**, **`XlsxRead`**, **`XlsxWrite`**: Encoder/decoder failures from the
//!   two table formats. These never escape the Sink Writer; they are caught per
//!   sink and logged.
//! - **`InvalidTransition`**: An operator command that the session state machine
//!   cannot honour in its current state.
//! - **`FeatureNotEnabled`**: A storage backend compiled out via feature flags.
//!
//! Incomplete frames are not errors; they surface as `parser::FrameRejection`.

use crate::session::SessionState;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, LoggerError>;

/// Everything that can go wrong in the logger.
#[derive(Error, Debug)]
pub enum LoggerError {
    /// The layered configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// A configuration or start request that cannot be used.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File system failure around a sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV encoder or decoder failed.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An existing workbook could not be read back.
    #[cfg(feature = "storage_xlsx")]
    #[error("Workbook read error: {0}")]
    XlsxRead(#[from] calamine::XlsxError),

    /// The workbook could not be written.
    #[cfg(feature = "storage_xlsx")]
    #[error("Workbook write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    /// A session operation that is not allowed in the current state.
    #[error("Cannot {action} while session is {from}")]
    InvalidTransition {
        /// State the session was in.
        from: SessionState,
        /// The refused operation, e.g. `"start"`.
        action: &'static str,
    },

    /// A storage backend that was compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_state_and_action() {
        let err = LoggerError::InvalidTransition {
            from: SessionState::Active,
            action: "start",
        };
        assert_eq!(err.to_string(), "Cannot start while session is Active");
    }

    #[test]
    fn configuration_error_keeps_message() {
        let err = LoggerError::Configuration("both sinks disabled".into());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: both sinks disabled"
        );
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> AppResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))?;
            Ok(())
        }
        match fails() {
            Err(LoggerError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
