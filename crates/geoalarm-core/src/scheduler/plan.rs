// ── Batch planning ──
//
// Pure computation of the wake-ups registered when an alarm is armed.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta};

use crate::capability::Clock;
use crate::model::{Alarm, TimeOfDay, WakePayload, WakeRegistration};

/// Body text of every alarm notification.
pub const NOTIFICATION_BODY: &str = "Stop this alarm once you reach the destination";

/// `time_of_day` on `now`'s calendar date, resolved by `clock` so the
/// offset is the one in force at the target rather than at `now`.
pub fn target_today(
    time_of_day: TimeOfDay,
    now: DateTime<FixedOffset>,
    clock: &dyn Clock,
) -> Option<DateTime<FixedOffset>> {
    let local = now.date_naive().and_time(time_of_day.to_naive_time()?);
    clock.resolve_local(local)
}

/// Registrations for one batch: up to `count` events spaced `interval`
/// apart starting at today's target. Nothing is planned when the target
/// is not in the future, and events at or before `now` are skipped.
pub fn plan_batch(
    alarm: &Alarm,
    clock: &dyn Clock,
    interval: Duration,
    count: usize,
) -> Vec<WakeRegistration> {
    let now = clock.now();
    let Some(target) = target_today(alarm.time_of_day, now, clock) else {
        return Vec::new();
    };
    if target <= now {
        return Vec::new();
    }
    let Ok(step) = TimeDelta::from_std(interval) else {
        return Vec::new();
    };

    let mut fire_at = target;
    let mut batch = Vec::with_capacity(count);
    for i in 0..count {
        if fire_at > now {
            batch.push(registration(alarm, format!("{}_repeat_{i}", alarm.id), fire_at));
        }
        fire_at += step;
    }
    batch
}

/// A single registration carrying the repeating payload.
pub fn registration(
    alarm: &Alarm,
    event_id: String,
    fire_at: DateTime<FixedOffset>,
) -> WakeRegistration {
    WakeRegistration {
        event_id,
        fire_at,
        title: alarm.name.clone(),
        body: NOTIFICATION_BODY.to_owned(),
        payload: WakePayload::repeating(alarm.id),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Timelike};

    use super::*;
    use crate::capability::memory::ManualClock;
    use crate::model::{AlarmDraft, Coordinate};

    fn tokyo(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 16, h, m, s)
            .unwrap()
    }

    fn alarm_at(h: u8, m: u8) -> Alarm {
        Alarm::from_draft(AlarmDraft::new(
            "Station",
            TimeOfDay::new(h, m).unwrap(),
            Coordinate::new(35.680_959_1, 139.767_306_8).unwrap(),
        ))
        .unwrap()
    }

    fn est() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn edt() -> FixedOffset {
        FixedOffset::west_opt(4 * 3600).unwrap()
    }

    /// New York on 2026-03-08: clocks jump from 02:00 EST to 03:00 EDT.
    fn new_york_spring_forward(local: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match local.hour() {
            0 | 1 => est().from_local_datetime(&local).single(),
            2 => None,
            _ => edt().from_local_datetime(&local).single(),
        }
    }

    struct SpringForwardClock {
        now: DateTime<FixedOffset>,
    }

    impl SpringForwardClock {
        fn at_local(h: u32, m: u32) -> Self {
            let local = NaiveDate::from_ymd_opt(2026, 3, 8)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap();
            Self {
                now: new_york_spring_forward(local).unwrap(),
            }
        }
    }

    impl Clock for SpringForwardClock {
        fn now(&self) -> DateTime<FixedOffset> {
            self.now
        }

        fn resolve_local(&self, local: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
            new_york_spring_forward(local)
        }
    }

    #[test]
    fn target_uses_the_clock_offset() {
        let clock = ManualClock::new(tokyo(6, 59, 0));
        let t = target_today(TimeOfDay::new(7, 0).unwrap(), clock.now(), &clock).unwrap();
        assert_eq!(t, tokyo(7, 0, 0));
        assert_eq!(t.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn target_follows_zone_rules_across_a_dst_jump() {
        let clock = SpringForwardClock::at_local(1, 0);
        assert_eq!(clock.now.offset(), &est());

        let t = target_today(TimeOfDay::new(7, 0).unwrap(), clock.now, &clock).unwrap();
        assert_eq!(t.offset(), &edt());
        assert_eq!(
            t.naive_utc(),
            NaiveDate::from_ymd_opt(2026, 3, 8)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap()
        );

        let batch = plan_batch(&alarm_at(7, 0), &clock, Duration::from_secs(5), 2);
        assert_eq!(batch[0].fire_at, t);
    }

    #[test]
    fn time_skipped_by_dst_plans_nothing() {
        let clock = SpringForwardClock::at_local(1, 0);
        assert!(target_today(TimeOfDay::new(2, 30).unwrap(), clock.now, &clock).is_none());
        assert!(plan_batch(&alarm_at(2, 30), &clock, Duration::from_secs(5), 4).is_empty());
    }

    #[test]
    fn batch_is_spaced_by_interval() {
        let alarm = alarm_at(7, 0);
        let clock = ManualClock::new(tokyo(6, 59, 0));
        let batch = plan_batch(&alarm, &clock, Duration::from_secs(5), 3);
        let times: Vec<_> = batch.iter().map(|r| r.fire_at).collect();
        assert_eq!(times, [tokyo(7, 0, 0), tokyo(7, 0, 5), tokyo(7, 0, 10)]);
        assert_eq!(batch[2].event_id, format!("{}_repeat_2", alarm.id));
        assert_eq!(batch[0].title, "Station");
        assert_eq!(batch[0].body, NOTIFICATION_BODY);
        assert!(batch.iter().all(|r| r.payload.is_repeating));
    }

    #[test]
    fn past_or_present_target_plans_nothing() {
        let alarm = alarm_at(7, 0);
        for now in [tokyo(7, 5, 0), tokyo(7, 0, 0)] {
            let clock = ManualClock::new(now);
            assert!(plan_batch(&alarm, &clock, Duration::from_secs(5), 64).is_empty());
        }
    }
}
