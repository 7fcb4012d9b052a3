// ── Wake-up registration types ──
//
// What the scheduler hands to the notification channel, and what the
// channel reports back as pending.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::alarm::AlarmId;

/// Data attached to every registration. Delivery callbacks receive it
/// back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakePayload {
    pub alarm_id: AlarmId,
    /// Set on every registration created by the repeating scheduler.
    /// Only repeating deliveries trigger a re-arm.
    pub is_repeating: bool,
}

impl WakePayload {
    pub fn repeating(alarm_id: AlarmId) -> Self {
        Self {
            alarm_id,
            is_repeating: true,
        }
    }
}

/// A single future wake-up to register with the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeRegistration {
    /// Unique per occurrence; always prefixed with the alarm id.
    pub event_id: String,
    pub fire_at: DateTime<FixedOffset>,
    pub title: String,
    pub body: String,
    pub payload: WakePayload,
}

/// A registration the channel still holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWake {
    pub event_id: String,
    pub fire_at: DateTime<FixedOffset>,
    pub payload: WakePayload,
}

impl From<&WakeRegistration> for PendingWake {
    fn from(r: &WakeRegistration) -> Self {
        Self {
            event_id: r.event_id.clone(),
            fire_at: r.fire_at,
            payload: r.payload,
        }
    }
}
