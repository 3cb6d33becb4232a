//! Unified error types for the nearstop core library.
//!
//! Each module has its own error type for the failures it can produce
//! ([`SourceError`], [`AcquisitionError`], [`WakeLockError`],
//! [`NotificationError`], [`TargetError`], [`ConfigError`]). They all convert
//! into [`NearstopError`] for callers that want a single type.
//!
//! Only [`NearstopError::SourceUnavailable`], [`NearstopError::InvalidTarget`]
//! and configuration errors ever reach a caller of the engine. The remaining
//! variants describe best-effort failures that the engine logs and absorbs.
//!
//! # Example
//!
//! ```rust
//! use nearstop_core::error::{NearstopError, Result};
//! use nearstop_core::Target;
//!
//! fn check(target: &Target) -> Result<()> {
//!     target.validate()?;
//!     Ok(())
//! }
//!
//! let err = check(&Target { latitude: None, ..Target::station("X", 0.0, 0.0) }).unwrap_err();
//! assert_eq!(err.error_code(), "INVALID_TARGET");
//! ```

use thiserror::Error;

use crate::alarm::NotificationError;
use crate::config::ConfigError;
use crate::source::{AcquisitionError, SourceError};
use crate::types::TargetError;
use crate::wake_lock::WakeLockError;

/// The unified error type for all nearstop operations.
#[derive(Debug, Error)]
pub enum NearstopError {
    // =========================================================================
    // LOCATION ERRORS
    // =========================================================================
    /// Positioning is missing entirely; the session cannot be armed.
    #[error("Location source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single position fix could not be acquired.
    #[error("Location acquisition failed: {0}")]
    AcquisitionFailed(#[from] AcquisitionError),

    // =========================================================================
    // SESSION ERRORS
    // =========================================================================
    /// The requested target cannot be monitored.
    #[error("Invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    // =========================================================================
    // BEST-EFFORT CHANNELS
    // =========================================================================
    /// The wake lock could not be obtained.
    #[error("Wake lock unavailable: {0}")]
    WakeLockUnavailable(#[from] WakeLockError),

    /// Notifications are blocked or failed.
    #[error("Notification not shown: {0}")]
    NotificationBlocked(#[from] NotificationError),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// Configuration could not be loaded, saved or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for nearstop operations.
pub type Result<T> = std::result::Result<T, NearstopError>;

impl From<SourceError> for NearstopError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable { message } => Self::SourceUnavailable(message),
        }
    }
}

impl NearstopError {
    /// Returns `true` if this error comes from a location source.
    #[inline]
    #[must_use]
    pub const fn is_source_error(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_) | Self::AcquisitionFailed(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` if monitoring can continue despite this error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionFailed(_) | Self::WakeLockUnavailable(_) | Self::NotificationBlocked(_)
        )
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            Self::AcquisitionFailed(_) => "ACQUISITION_FAILED",
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::WakeLockUnavailable(_) => "WAKE_LOCK_UNAVAILABLE",
            Self::NotificationBlocked(_) => "NOTIFICATION_BLOCKED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_source_error_classification() {
        let err: NearstopError = SourceError::Unavailable {
            message: "no GPS".into(),
        }
        .into();
        assert!(err.is_source_error());
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");

        let err: NearstopError = AcquisitionError::Timeout { timeout_ms: 5000 }.into();
        assert!(err.is_source_error());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_best_effort_errors_are_recoverable() {
        let err: NearstopError = WakeLockError::Unsupported.into();
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "WAKE_LOCK_UNAVAILABLE");

        let err: NearstopError = NotificationError::Blocked.into();
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "NOTIFICATION_BLOCKED");
    }

    #[test]
    fn test_config_error_classification() {
        let err: NearstopError = ConfigError::ValidationError {
            field: "live.timeout_ms".into(),
            message: "must be positive".into(),
        }
        .into();
        assert!(err.is_config_error());
        assert!(format!("{err}").contains("live.timeout_ms"));
    }

    #[test]
    fn test_from_io_error() {
        let err: NearstopError = IoErr::new(ErrorKind::NotFound, "gone").into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_display_messages() {
        let err = NearstopError::SourceUnavailable("no positioning support".into());
        assert!(format!("{err}").contains("no positioning support"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<NearstopError>();
        assert_sync::<NearstopError>();
    }
}
