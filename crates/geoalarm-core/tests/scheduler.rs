#![allow(clippy::unwrap_used)]
// Integration tests for `NotificationScheduler` against the in-memory channel.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone};
use pretty_assertions::assert_eq;

use geoalarm_core::capability::memory::{InMemoryChannel, ManualClock};
use geoalarm_core::{
    Alarm, AlarmDraft, AlarmId, ControllerConfig, Coordinate, CoreError, NotificationChannel,
    NotificationScheduler, PermissionState, TimeOfDay, WakePayload,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn tokyo(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(9 * 3600)
        .unwrap()
        .with_ymd_and_hms(2026, 10, 16, h, m, s)
        .unwrap()
}

fn station() -> Coordinate {
    Coordinate::new(35.680_959_1, 139.767_306_8).unwrap()
}

fn alarm_at(h: u8, m: u8) -> Alarm {
    Alarm::from_draft(AlarmDraft::new(
        "Tokyo Station",
        TimeOfDay::new(h, m).unwrap(),
        station(),
    ))
    .unwrap()
}

struct Harness {
    channel: Arc<InMemoryChannel>,
    clock: Arc<ManualClock>,
    scheduler: NotificationScheduler,
}

fn setup(now: DateTime<FixedOffset>) -> Harness {
    setup_with(now, InMemoryChannel::new(), &ControllerConfig::default())
}

fn setup_with(now: DateTime<FixedOffset>, channel: InMemoryChannel, config: &ControllerConfig) -> Harness {
    let channel = Arc::new(channel);
    let clock = Arc::new(ManualClock::new(now));
    let scheduler = NotificationScheduler::new(channel.clone(), clock.clone(), config);
    Harness {
        channel,
        clock,
        scheduler,
    }
}

fn lookup(alarm: &Alarm) -> impl Fn(&AlarmId) -> Option<Arc<Alarm>> + '_ {
    move |id: &AlarmId| (*id == alarm.id).then(|| Arc::new(alarm.clone()))
}

// ── Batch scheduling ────────────────────────────────────────────────

#[test]
fn test_batch_fills_ceiling_within_max_duration() {
    let h = setup(tokyo(6, 59, 0));
    let alarm = alarm_at(7, 0);
    let target = tokyo(7, 0, 0);

    let report = h.scheduler.schedule(&alarm);
    assert_eq!(report.registered, 64);
    assert!(report.is_clean());

    let pending = h.channel.list_pending();
    assert_eq!(pending.len(), 64);
    let horizon = target + TimeDelta::seconds(1800);
    assert!(pending.iter().all(|p| p.fire_at >= target && p.fire_at <= horizon));
    assert!(pending.iter().all(|p| p.payload == WakePayload::repeating(alarm.id)));
    assert_eq!(pending[0].fire_at, target);
    assert_eq!(pending[1].fire_at, target + TimeDelta::seconds(5));
    assert_eq!(pending[0].event_id, format!("{}_repeat_0", alarm.id));
    assert!(h.scheduler.is_repeating(&alarm.id));
}

#[test]
fn test_short_duration_limits_batch_below_ceiling() {
    let config = ControllerConfig {
        max_repeat_duration: Duration::from_secs(60),
        ..ControllerConfig::default()
    };
    let h = setup_with(tokyo(6, 0, 0), InMemoryChannel::new(), &config);
    assert_eq!(h.scheduler.schedule(&alarm_at(7, 0)).registered, 12);
}

#[test]
fn test_passed_alarm_is_not_scheduled() {
    let h = setup(tokyo(7, 5, 0));
    let alarm = alarm_at(7, 0);

    let report = h.scheduler.schedule(&alarm);
    assert_eq!(report.registered, 0);
    assert!(h.channel.list_pending().is_empty());
    assert!(!h.scheduler.is_repeating(&alarm.id));
}

#[test]
fn test_unauthorized_channel_schedules_nothing() {
    let h = setup(tokyo(6, 0, 0));
    h.channel.set_authorization(PermissionState::NotDetermined);

    let report = h.scheduler.schedule(&alarm_at(7, 0));
    assert_eq!(report.registered, 0);
    assert!(report.is_clean());
    assert_eq!(h.channel.pending_count(), 0);
}

#[test]
fn test_disabled_alarm_is_not_scheduled() {
    let h = setup(tokyo(6, 0, 0));
    let alarm = Alarm {
        enabled: false,
        ..alarm_at(7, 0)
    };
    assert_eq!(h.scheduler.schedule(&alarm).registered, 0);
    assert_eq!(h.channel.pending_count(), 0);
}

#[test]
fn test_registration_failures_do_not_abort_batch() {
    let h = setup(tokyo(6, 0, 0));
    let alarm = alarm_at(7, 0);
    h.channel.fail_event(format!("{}_repeat_3", alarm.id));

    let report = h.scheduler.schedule(&alarm);
    assert_eq!(report.registered, 63);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        CoreError::SchedulingFailure { event_id, .. } if event_id.ends_with("_repeat_3")
    ));
}

#[test]
fn test_platform_ceiling_is_reported_not_fatal() {
    let h = setup_with(tokyo(6, 0, 0), InMemoryChannel::with_ceiling(10), &ControllerConfig::default());
    let report = h.scheduler.schedule(&alarm_at(7, 0));
    assert_eq!(report.registered, 10);
    assert_eq!(report.failures.len(), 54);
}

// ── Re-arm ──────────────────────────────────────────────────────────

#[test]
fn test_delivery_rearms_exactly_one_event() {
    let h = setup(tokyo(6, 59, 0));
    let alarm = alarm_at(7, 0);
    h.scheduler.schedule(&alarm);

    h.clock.set(tokyo(7, 0, 0));
    let fired = h.channel.fire_due(tokyo(7, 0, 0));
    assert_eq!(fired.len(), 1);

    let report = h
        .scheduler
        .on_delivered(&fired[0].payload, lookup(&alarm));
    assert_eq!(report.registered, 1);

    let next: Vec<_> = h
        .channel
        .list_pending()
        .into_iter()
        .filter(|p| p.event_id.contains("_next_"))
        .collect();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].fire_at, tokyo(7, 0, 5));
    assert!(next[0].event_id.starts_with(&alarm.id.to_string()));
}

#[test]
fn test_non_repeating_payload_does_not_rearm() {
    let h = setup(tokyo(6, 59, 0));
    let alarm = alarm_at(7, 0);
    h.scheduler.schedule(&alarm);
    let before = h.channel.pending_count();

    let payload = WakePayload {
        alarm_id: alarm.id,
        is_repeating: false,
    };
    assert_eq!(h.scheduler.on_delivered(&payload, lookup(&alarm)).registered, 0);
    assert_eq!(h.channel.pending_count(), before);
}

#[test]
fn test_missing_alarm_is_a_missed_rearm() {
    let h = setup(tokyo(6, 59, 0));
    let alarm = alarm_at(7, 0);
    h.scheduler.schedule(&alarm);
    h.channel.revoke_all();

    let report = h
        .scheduler
        .on_delivered(&WakePayload::repeating(alarm.id), |_| None);
    assert_eq!(report.registered, 0);
    assert!(report.is_clean());
    assert_eq!(h.channel.pending_count(), 0);
}

#[test]
fn test_disabled_alarm_is_not_rearmed() {
    let h = setup(tokyo(6, 59, 0));
    let alarm = alarm_at(7, 0);
    h.scheduler.schedule(&alarm);
    h.channel.revoke_all();

    let disabled = Alarm {
        enabled: false,
        ..alarm.clone()
    };
    let report = h
        .scheduler
        .on_delivered(&WakePayload::repeating(alarm.id), lookup(&disabled));
    assert_eq!(report.registered, 0);
    assert!(!h.scheduler.is_repeating(&alarm.id));
}

// ── Cancel ──────────────────────────────────────────────────────────

#[test]
fn test_cancel_revokes_and_blocks_rearm() {
    let h = setup(tokyo(6, 59, 0));
    let alarm = alarm_at(7, 0);
    let other = alarm_at(8, 0);
    h.scheduler.schedule(&alarm);
    h.scheduler.schedule(&other);

    assert_eq!(h.scheduler.cancel(&alarm.id), 64);
    assert!(h.scheduler.pending_for(&alarm.id).is_empty());
    assert_eq!(h.scheduler.pending_for(&other.id).len(), 64);

    // A delivery that was already in flight must not resurrect it.
    let report = h
        .scheduler
        .on_delivered(&WakePayload::repeating(alarm.id), lookup(&alarm));
    assert_eq!(report.registered, 0);
    assert!(h.scheduler.pending_for(&alarm.id).is_empty());
}

#[test]
fn test_cancel_is_idempotent() {
    let h = setup(tokyo(6, 59, 0));
    let alarm = alarm_at(7, 0);
    h.scheduler.schedule(&alarm);

    h.scheduler.cancel(&alarm.id);
    let after_first = (h.channel.list_pending(), h.scheduler.is_repeating(&alarm.id));
    assert_eq!(h.scheduler.cancel(&alarm.id), 0);
    let after_second = (h.channel.list_pending(), h.scheduler.is_repeating(&alarm.id));
    assert_eq!(after_first, after_second);
}

#[test]
fn test_cancel_racing_deliveries_never_rearms() {
    for _ in 0..50 {
        let h = setup(tokyo(6, 59, 0));
        let alarm = alarm_at(7, 0);
        h.scheduler.schedule(&alarm);
        let start = Barrier::new(9);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    start.wait();
                    for _ in 0..20 {
                        h.scheduler
                            .on_delivered(&WakePayload::repeating(alarm.id), lookup(&alarm));
                    }
                });
            }
            s.spawn(|| {
                start.wait();
                h.scheduler.cancel(&alarm.id);
            });
        });

        assert!(!h.scheduler.is_repeating(&alarm.id));
        assert!(h.scheduler.pending_for(&alarm.id).is_empty());
        assert_eq!(h.channel.pending_count(), 0);
    }
}

// ── Reschedule / resume ─────────────────────────────────────────────

#[test]
fn test_reschedule_all_only_arms_enabled() {
    let h = setup(tokyo(6, 59, 0));
    let a = alarm_at(7, 0);
    let b = alarm_at(7, 30);
    // B has stale registrations from when it was still enabled.
    h.scheduler.schedule(&b);
    let b = Arc::new(Alarm {
        enabled: false,
        ..b
    });

    let report = h.scheduler.reschedule_all(&[Arc::new(a.clone()), Arc::clone(&b)]);
    assert_eq!(report.registered, 64);
    assert!(h.scheduler.pending_for(&b.id).is_empty());
    assert_eq!(h.scheduler.pending_for(&a.id).len(), 64);
    assert!(!h.scheduler.is_repeating(&b.id));
    assert!(h.channel.list_pending().iter().all(|p| p.payload.alarm_id == a.id));
}

#[test]
fn test_resume_keeps_alarm_ringing() {
    let h = setup(tokyo(7, 10, 0));
    let alarm = alarm_at(7, 0);

    let report = h.scheduler.resume(&alarm);
    assert_eq!(report.registered, 1);
    assert!(h.scheduler.is_repeating(&alarm.id));
    let pending = h.scheduler.pending_for(&alarm.id);
    assert_eq!(pending[0].fire_at, tokyo(7, 10, 5));
}
