//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use geoalarm_config::ConfigError;
use geoalarm_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const OUT_OF_RANGE: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const STORAGE: i32 = 6;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Proximity ────────────────────────────────────────────────────

    #[error("Too far from alarm {alarm}: {distance_m:.0} m away, must be within {radius_m:.0} m")]
    #[diagnostic(
        code(geoalarm::out_of_range),
        help(
            "Go to the alarm's location first.\n\
             Check the distance with: geoalarm distance {alarm} --at LAT,LON"
        )
    )]
    OutOfRange {
        alarm: String,
        distance_m: f64,
        radius_m: f64,
    },

    #[error("Current position is unknown")]
    #[diagnostic(
        code(geoalarm::no_position),
        help("Pass your current position with --at LAT,LON (or GEOALARM_AT).")
    )]
    NoPosition,

    #[error("{capability} permission has not been granted")]
    #[diagnostic(code(geoalarm::permission))]
    PermissionDenied { capability: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Alarm '{identifier}' not found")]
    #[diagnostic(
        code(geoalarm::not_found),
        help("Run: geoalarm list to see available alarms")
    )]
    NotFound { identifier: String },

    #[error("'{identifier}' matches {count} alarms")]
    #[diagnostic(
        code(geoalarm::ambiguous),
        help("Use a longer ID prefix or the full ID from: geoalarm list")
    )]
    Ambiguous { identifier: String, count: usize },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(geoalarm::validation))]
    Validation { field: String, reason: String },

    // ── Storage / scheduling ─────────────────────────────────────────

    #[error("Could not save alarms: {reason}")]
    #[diagnostic(
        code(geoalarm::storage),
        help("Check that the data file and its directory are writable (see --data-file).")
    )]
    Storage { reason: String },

    #[error("Could not register wake-up {event_id}: {reason}")]
    #[diagnostic(code(geoalarm::scheduling))]
    Scheduling { event_id: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(geoalarm::config))]
    Config(Box<figment::Error>),

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(geoalarm::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(geoalarm::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Internal ─────────────────────────────────────────────────────

    #[error("Internal error: {message}")]
    #[diagnostic(code(geoalarm::internal))]
    Internal { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(geoalarm::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(geoalarm::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::OutOfRange { .. } => exit_code::OUT_OF_RANGE,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::Storage { .. } => exit_code::STORAGE,
            Self::NoPosition
            | Self::Ambiguous { .. }
            | Self::Validation { .. }
            | Self::ConfigExists { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProximityDenied {
                alarm_id,
                distance_m,
                radius_m,
            } => CliError::OutOfRange {
                alarm: alarm_id.to_string(),
                distance_m,
                radius_m,
            },

            CoreError::PositionUnavailable => CliError::NoPosition,

            CoreError::PermissionDenied { capability } => CliError::PermissionDenied {
                capability: capability.to_string(),
            },

            CoreError::SchedulingFailure { event_id, reason } => {
                CliError::Scheduling { event_id, reason }
            }

            CoreError::PersistenceFailure { reason } => CliError::Storage { reason },

            CoreError::AlarmNotFound { id } => CliError::NotFound {
                identifier: id.to_string(),
            },

            CoreError::ValidationFailed { field, reason } => {
                CliError::Validation { field, reason }
            }

            CoreError::ControllerStopped => CliError::Internal {
                message: "alarm controller is not running".into(),
            },

            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Figment(err) => CliError::Config(err),
            ConfigError::Io(err) => CliError::Io(err),
            ConfigError::Serialization(err) => CliError::Internal {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geoalarm_core::{AlarmId, Capability};

    use super::*;

    #[test]
    fn proximity_denial_maps_to_out_of_range() {
        let id = AlarmId::new();
        let err = CliError::from(CoreError::ProximityDenied {
            alarm_id: id,
            distance_m: 150.2,
            radius_m: 100.0,
        });
        assert_eq!(err.exit_code(), exit_code::OUT_OF_RANGE);
        assert_eq!(
            err.to_string(),
            format!("Too far from alarm {id}: 150 m away, must be within 100 m")
        );
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(
            CliError::from(CoreError::PositionUnavailable).exit_code(),
            exit_code::USAGE
        );
        assert_eq!(
            CliError::from(CoreError::AlarmNotFound { id: AlarmId::new() }).exit_code(),
            exit_code::NOT_FOUND
        );
        assert_eq!(
            CliError::from(CoreError::PermissionDenied {
                capability: Capability::Location
            })
            .exit_code(),
            exit_code::PERMISSION
        );
        assert_eq!(
            CliError::from(CoreError::PersistenceFailure {
                reason: "disk full".into()
            })
            .exit_code(),
            exit_code::STORAGE
        );
        assert_eq!(
            CliError::from(CoreError::Internal("boom".into())).exit_code(),
            exit_code::GENERAL
        );
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "alarm.radius_m".into(),
            reason: "must be positive".into(),
        });
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "alarm.radius_m"));
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
