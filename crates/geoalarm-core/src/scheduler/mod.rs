// ── Repeating notification scheduler ──
//
// Turns an armed alarm into a bounded batch of platform wake-ups and
// keeps it ringing past the batch by re-arming one event per delivery.
//
// The set of actively repeating alarms lives behind a single mutex.
// Re-arm checks membership and registers while holding it, and cancel
// removes membership and revokes while holding it, so a delivery racing
// a cancel can never resurrect the alarm.

mod plan;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta};
use tracing::{debug, info, warn};

use crate::capability::{Clock, NotificationChannel, lock};
use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::model::{Alarm, AlarmId, PendingWake, WakePayload, WakeRegistration};

pub use plan::{NOTIFICATION_BODY, plan_batch, target_today};

/// Outcome of a scheduling operation. Individual registration failures
/// never abort the rest of a batch; they are collected here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleReport {
    pub registered: usize,
    /// Always `CoreError::SchedulingFailure`.
    pub failures: Vec<CoreError>,
    /// Set when an enabled alarm was skipped because notifications are
    /// not authorized.
    pub unauthorized: bool,
}

impl ScheduleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: ScheduleReport) {
        self.registered += other.registered;
        self.failures.extend(other.failures);
        self.unauthorized |= other.unauthorized;
    }
}

/// Schedules, re-arms and cancels the wake-ups of every alarm.
pub struct NotificationScheduler {
    channel: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    batch_size: usize,
    repeating: Mutex<HashSet<AlarmId>>,
    next_seq: AtomicU64,
}

impl NotificationScheduler {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            channel,
            clock,
            interval: config.repeat_interval,
            batch_size: config.batch_size(),
            repeating: Mutex::new(HashSet::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Pre-register today's batch for `alarm` and mark it repeating.
    ///
    /// No-op when the alarm is disabled, notifications are not
    /// authorized, or its time has already passed today.
    pub fn schedule(&self, alarm: &Alarm) -> ScheduleReport {
        let mut repeating = lock(&self.repeating);
        self.schedule_locked(&mut repeating, alarm)
    }

    /// Handle a delivered wake-up: register one more event for an alarm
    /// that is still enabled and repeating. `lookup` resolves the current
    /// alarm record.
    pub fn on_delivered<F>(&self, payload: &WakePayload, lookup: F) -> ScheduleReport
    where
        F: Fn(&AlarmId) -> Option<Arc<Alarm>>,
    {
        if !payload.is_repeating {
            return ScheduleReport::default();
        }
        let id = payload.alarm_id;

        let mut repeating = lock(&self.repeating);
        if !repeating.contains(&id) {
            debug!(alarm_id = %id, "delivery for alarm that is not repeating, no re-arm");
            return ScheduleReport::default();
        }
        let Some(alarm) = lookup(&id) else {
            warn!(alarm_id = %id, "alarm missing at delivery, re-arm skipped");
            return ScheduleReport::default();
        };
        if !alarm.enabled {
            repeating.remove(&id);
            debug!(alarm_id = %id, "alarm disabled at delivery, no re-arm");
            return ScheduleReport::default();
        }

        let now = self.clock.now();
        let Some(registration) = self.next_registration(&alarm, now) else {
            return ScheduleReport::default();
        };
        let report = self.register_all(std::slice::from_ref(&registration));
        debug!(alarm_id = %id, fire_at = %registration.fire_at, "re-armed");
        report
    }

    /// Mark `alarm` repeating and register a single event one interval
    /// from now. Used to keep a ringing alarm ringing after a full
    /// reschedule.
    pub fn resume(&self, alarm: &Alarm) -> ScheduleReport {
        if !alarm.enabled {
            return ScheduleReport::default();
        }
        let mut repeating = lock(&self.repeating);
        let Some(registration) = self.next_registration(alarm, self.clock.now()) else {
            return ScheduleReport::default();
        };
        let report = self.register_all(std::slice::from_ref(&registration));
        if report.registered > 0 {
            repeating.insert(alarm.id);
        }
        report
    }

    /// Stop repeating and revoke every pending registration of `id`.
    /// Returns how many registrations were revoked. Idempotent.
    pub fn cancel(&self, id: &AlarmId) -> usize {
        let mut repeating = lock(&self.repeating);
        repeating.remove(id);

        let prefix = id.to_string();
        let mut revoked = 0;
        for pending in self.channel.list_pending() {
            if pending.payload.alarm_id == *id || pending.event_id.starts_with(&prefix) {
                self.channel.revoke(&pending.event_id);
                revoked += 1;
            }
        }
        if revoked > 0 {
            debug!(alarm_id = %id, revoked, "cancelled pending wake-ups");
        }
        revoked
    }

    /// Revoke everything, forget every repeating mark, then schedule each
    /// enabled alarm afresh.
    pub fn reschedule_all(&self, alarms: &[Arc<Alarm>]) -> ScheduleReport {
        let mut repeating = lock(&self.repeating);
        self.channel.revoke_all();
        repeating.clear();

        let mut report = ScheduleReport::default();
        for alarm in alarms.iter().filter(|a| a.enabled) {
            report.merge(self.schedule_locked(&mut repeating, alarm));
        }
        info!(
            alarms = alarms.len(),
            registered = report.registered,
            failures = report.failures.len(),
            "rescheduled all alarms"
        );
        report
    }

    pub fn is_repeating(&self, id: &AlarmId) -> bool {
        lock(&self.repeating).contains(id)
    }

    /// Pending registrations belonging to `id`, in fire order.
    pub fn pending_for(&self, id: &AlarmId) -> Vec<PendingWake> {
        let prefix = id.to_string();
        self.channel
            .list_pending()
            .into_iter()
            .filter(|p| p.payload.alarm_id == *id || p.event_id.starts_with(&prefix))
            .collect()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn schedule_locked(&self, repeating: &mut HashSet<AlarmId>, alarm: &Alarm) -> ScheduleReport {
        if !alarm.enabled {
            return ScheduleReport::default();
        }
        let authorization = self.channel.authorization();
        if !authorization.is_granted() {
            debug!(alarm_id = %alarm.id, %authorization, "notifications not authorized, not scheduling");
            return ScheduleReport {
                unauthorized: true,
                ..ScheduleReport::default()
            };
        }

        let batch = plan_batch(alarm, self.clock.as_ref(), self.interval, self.batch_size);
        if batch.is_empty() {
            debug!(alarm_id = %alarm.id, time = %alarm.time_of_day, "alarm time already passed today");
            return ScheduleReport::default();
        }

        let report = self.register_all(&batch);
        if report.registered > 0 {
            repeating.insert(alarm.id);
        }
        debug!(
            alarm_id = %alarm.id,
            registered = report.registered,
            failures = report.failures.len(),
            "scheduled batch"
        );
        report
    }

    fn next_registration(&self, alarm: &Alarm, now: DateTime<FixedOffset>) -> Option<WakeRegistration> {
        let step = TimeDelta::from_std(self.interval).ok()?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let event_id = format!("{}_next_{}_{seq}", alarm.id, now.timestamp_millis());
        Some(plan::registration(alarm, event_id, now + step))
    }

    fn register_all(&self, batch: &[WakeRegistration]) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        for registration in batch {
            match self.channel.register(registration) {
                Ok(()) => report.registered += 1,
                Err(e) => {
                    warn!(event_id = %registration.event_id, error = %e, "failed to register wake-up");
                    report.failures.push(CoreError::SchedulingFailure {
                        event_id: registration.event_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }
}
