// ── Lifecycle state and events ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::alarm::AlarmId;
use crate::error::Capability;

/// Where an alarm currently sits in its lifecycle.
///
/// ```text
///            add / enable             wake delivered
///  Disabled ─────────────► Armed ─────────────────► Alerting
///     ▲                      │  ▲                      │
///     │   disable / delete   │  └──── re-arm ──────────┤
///     └──────────────────────┘                         │
///     ▲                 stop (in range)                │
///     └────────────────────────────────────────────────┘
/// ```
///
/// `Dormant` is an enabled alarm with nothing registered: its time has
/// already passed today, or notifications are not authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlarmState {
    Disabled,
    Dormant,
    Armed,
    Alerting,
}

/// Broadcast to presentation layers after every observable change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Added { alarm_id: AlarmId },
    Updated { alarm_id: AlarmId },
    Deleted { alarm_id: AlarmId },
    Armed { alarm_id: AlarmId, registered: usize },
    Disarmed { alarm_id: AlarmId },
    Alerting { alarm_id: AlarmId },
    Stopped { alarm_id: AlarmId },
    /// A gated request was refused; nothing changed.
    Rejected { alarm_id: AlarmId, reason: String },
    SchedulingFailed { event_id: String, reason: String },
    /// Scheduling was skipped until the platform grants `capability`.
    PermissionMissing { capability: Capability },
    PersistenceFailed { reason: String },
    Rescheduled { alarms: usize },
}
