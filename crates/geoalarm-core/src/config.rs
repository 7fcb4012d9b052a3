// ── Runtime controller configuration ──
//
// Tuning for the proximity gate and the repeating scheduler. Never
// touches disk: geoalarm-config (or a test) builds a `ControllerConfig`
// and hands it to the `Controller`.

use std::time::Duration;

/// Configuration for a single alarm controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Radius in metres inside which gated operations are allowed.
    pub radius_m: f64,
    /// Gap between consecutive wake-ups of a ringing alarm.
    pub repeat_interval: Duration,
    /// How long a single pre-registered batch keeps an alarm ringing.
    pub max_repeat_duration: Duration,
    /// Platform limit on pending registrations per batch.
    pub pending_ceiling: usize,
    /// Capacity of the bounded command channel.
    pub command_buffer: usize,
}

impl ControllerConfig {
    /// Number of wake-ups pre-registered when an alarm is armed.
    pub fn batch_size(&self) -> usize {
        let interval = self.repeat_interval.as_millis();
        if interval == 0 {
            return 0;
        }
        let fits = self.max_repeat_duration.as_millis() / interval;
        usize::try_from(fits).map_or(self.pending_ceiling, |n| n.min(self.pending_ceiling))
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            radius_m: 100.0,
            repeat_interval: Duration::from_secs(5),
            max_repeat_duration: Duration::from_secs(30 * 60),
            pending_ceiling: 64,
            command_buffer: 64,
        }
    }
}
