//! Error types for the adjacency core library.
//!
//! Two families of failures exist and are deliberately kept apart:
//!
//! - [`SampleError`] — recoverable, per-sample rejection reasons. A pair that
//!   hits one of these keeps its last valid values, flips `data_valid` off and
//!   records the kind; nothing propagates and no events fire.
//! - [`AdjacencyError`] — hard failures: invalid configuration (caught before
//!   any state machine exists), config file I/O and parsing, malformed entity
//!   ids. These surface to the caller as `Result`.

use std::path::PathBuf;

use thiserror::Error;

/// Which side of a pair a rejection applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The reference entity all distances are measured from.
    Anchor,
    /// The tracked entity whose distance to the anchor is computed.
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anchor => f.write_str("anchor"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// Recoverable rejection of a single position sample.
///
/// These never abort processing; they are only visible as the pair's
/// `last_error` attribute until the next valid sample arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SampleError {
    /// No coordinate shape matched, or values were non-finite / out of range.
    #[error("invalid_coordinate")]
    InvalidCoordinate,

    /// Reported GPS accuracy exceeded the configured ceiling.
    #[error("accuracy_rejected")]
    AccuracyRejected,

    /// Implied movement speed between consecutive fixes was unrealistic.
    #[error("speed_filtered_{0}")]
    SpeedFiltered(Side),

    /// A fix arrived after a long silence; updates are held briefly while the
    /// source resynchronises.
    #[error("resync_{0}")]
    Resync(Side),
}

/// The unified error type for all adjacency operations.
#[derive(Debug, Error)]
pub enum AdjacencyError {
    /// A configuration value violated its bounds (for example
    /// `exit_threshold_m < entry_threshold_m`). Fatal at setup time.
    #[error("Invalid configuration for '{field}': {message}")]
    ConfigInvalid {
        /// Name of the offending configuration field.
        field: &'static str,
        /// Human-readable description of the violation.
        message: String,
    },

    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed or serialized.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// An entity id did not have the `domain.object_id` shape.
    #[error("Invalid entity id: '{0}'. Expected 'domain.object_id' (e.g. 'device_tracker.phone').")]
    InvalidEntityId(String),

    /// An observation referenced an entity that is neither the anchor nor a
    /// configured target.
    #[error("Unknown entity: '{0}'. Not the anchor or a configured target.")]
    UnknownEntity(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for adjacency operations.
pub type Result<T> = std::result::Result<T, AdjacencyError>;

impl AdjacencyError {
    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. } | Self::ConfigNotFound(_) | Self::ConfigParse(_)
        )
    }

    /// Returns `true` if this error concerns an entity id rather than state.
    #[inline]
    #[must_use]
    pub const fn is_entity_error(&self) -> bool {
        matches!(self, Self::InvalidEntityId(_) | Self::UnknownEntity(_))
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigInvalid { .. } => "CONFIG_INVALID",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParse(_) => "CONFIG_PARSE_ERROR",
            Self::InvalidEntityId(_) => "INVALID_ENTITY_ID",
            Self::UnknownEntity(_) => "UNKNOWN_ENTITY",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

impl From<toml::de::Error> for AdjacencyError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<toml::ser::Error> for AdjacencyError {
    fn from(err: toml::ser::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_sample_error_display() {
        assert_eq!(SampleError::InvalidCoordinate.to_string(), "invalid_coordinate");
        assert_eq!(SampleError::AccuracyRejected.to_string(), "accuracy_rejected");
        assert_eq!(
            SampleError::SpeedFiltered(Side::Anchor).to_string(),
            "speed_filtered_anchor"
        );
        assert_eq!(SampleError::Resync(Side::Target).to_string(), "resync_target");
    }

    #[test]
    fn test_config_error_classification() {
        let err = AdjacencyError::ConfigInvalid {
            field: "exit_threshold_m",
            message: "must be >= entry_threshold_m".into(),
        };
        assert!(err.is_config_error());
        assert!(AdjacencyError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(AdjacencyError::ConfigParse("bad toml".into()).is_config_error());
        assert!(!AdjacencyError::UnknownEntity("sensor.x".into()).is_config_error());
    }

    #[test]
    fn test_entity_error_classification() {
        assert!(AdjacencyError::InvalidEntityId("nodot".into()).is_entity_error());
        assert!(AdjacencyError::UnknownEntity("sensor.x".into()).is_entity_error());
        assert!(!AdjacencyError::ConfigParse("x".into()).is_entity_error());
    }

    #[test]
    fn test_error_codes() {
        let err = AdjacencyError::ConfigInvalid {
            field: "entry_threshold_m",
            message: "must be > 0".into(),
        };
        assert_eq!(err.error_code(), "CONFIG_INVALID");
        assert_eq!(
            AdjacencyError::InvalidEntityId("x".into()).error_code(),
            "INVALID_ENTITY_ID"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: AdjacencyError = io_err.into();
        assert!(matches!(err, AdjacencyError::Io(_)));
    }

    #[test]
    fn test_error_display_messages() {
        let err = AdjacencyError::ConfigInvalid {
            field: "exit_threshold_m",
            message: "700 < 500".into(),
        };
        assert!(err.to_string().contains("exit_threshold_m"));

        let err = AdjacencyError::InvalidEntityId("no-dot".into());
        assert!(err.to_string().contains("no-dot"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<AdjacencyError>();
        assert_sync::<AdjacencyError>();
        assert_send::<SampleError>();
        assert_sync::<SampleError>();
    }
}
