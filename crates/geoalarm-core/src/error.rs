// ── Core error types ──
//
// User-facing errors from geoalarm-core. Platform capabilities report
// `CapabilityError`; the lifecycle translates those into `CoreError`
// variants that carry enough context for a remediation message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::AlarmId;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    // ── Proximity gate ───────────────────────────────────────────────
    #[error(
        "Alarm {alarm_id} can only be changed on site: {distance_m:.0} m away, must be within {radius_m:.0} m"
    )]
    ProximityDenied {
        alarm_id: AlarmId,
        distance_m: f64,
        radius_m: f64,
    },

    #[error("Current position is not known yet")]
    PositionUnavailable,

    #[error("{capability} permission has not been granted")]
    PermissionDenied { capability: Capability },

    // ── Non-fatal side effects ───────────────────────────────────────
    #[error("Failed to register wake-up {event_id}: {reason}")]
    SchedulingFailure { event_id: String, reason: String },

    #[error("Failed to persist alarms: {reason}")]
    PersistenceFailure { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Alarm not found: {id}")]
    AlarmNotFound { id: AlarmId },

    #[error("Invalid {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Alarm controller is not running")]
    ControllerStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Platform authorization a request depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    #[strum(serialize = "Location")]
    Location,
    #[strum(serialize = "Notification")]
    Notification,
}

impl CoreError {
    /// Whether the user can resolve this by acting (moving, waiting,
    /// granting access) rather than it being a programming error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::ControllerStopped)
    }

    /// Short actionable hint for presentation layers.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::ProximityDenied { .. } => {
                Some("Go to the alarm's destination, then try again.")
            }
            Self::PositionUnavailable => {
                Some("Wait for a location fix, or grant location access.")
            }
            Self::PermissionDenied {
                capability: Capability::Location,
            } => Some("Allow location access in the system settings."),
            Self::PermissionDenied {
                capability: Capability::Notification,
            } => Some("Allow notifications in the system settings."),
            Self::ValidationFailed { .. } => Some("Correct the highlighted field."),
            _ => None,
        }
    }
}

// ── Capability errors ───────────────────────────────────────────────

/// Failure reported by a platform capability implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("pending registration limit of {limit} reached")]
    Capacity { limit: usize },

    #[error("permission was revoked")]
    PermissionRevoked,

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CapabilityError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CapabilityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("malformed alarm data: {err}"))
    }
}
