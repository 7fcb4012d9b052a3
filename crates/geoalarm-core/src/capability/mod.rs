// ── Platform capabilities ──
//
// Narrow interfaces to everything the core does not own: the position
// provider, the notification delivery channel, the audible alert, the
// durable store and the wall clock. Implementations are shared as
// `Arc<dyn _>` and may be called from any thread.

mod json_file;
pub mod memory;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use strum::Display;

use crate::error::CapabilityError;
use crate::model::{Alarm, Coordinate, PendingWake, WakePayload, WakeRegistration};

pub use json_file::JsonFileStore;

/// Authorization state of a platform permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionState {
    #[default]
    NotDetermined,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

// ── Subscriptions ───────────────────────────────────────────────────

/// Callback registered with a capability.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered list of callbacks for one event type. Callbacks run in
/// registration order, outside the list's lock.
pub struct Subscribers<T> {
    callbacks: Mutex<Vec<Callback<T>>>,
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, callback: Callback<T>) {
        lock(&self.callbacks).push(callback);
    }

    pub fn notify(&self, value: &T) {
        let callbacks = lock(&self.callbacks).clone();
        for cb in &callbacks {
            cb(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.callbacks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Poison-tolerant lock: a panicked callback must not wedge the core.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Capability traits ───────────────────────────────────────────────

/// Live device position.
pub trait PositionSource: Send + Sync {
    /// Freshest fix, if any.
    fn current_position(&self) -> Option<Coordinate>;
    /// Called with every new fix.
    fn on_update(&self, callback: Callback<Coordinate>);
    fn request_permission(&self);
    fn permission(&self) -> PermissionState;
}

/// OS notification scheduling and delivery.
pub trait NotificationChannel: Send + Sync {
    fn register(&self, registration: &WakeRegistration) -> Result<(), CapabilityError>;
    fn revoke(&self, event_id: &str);
    fn revoke_all(&self);
    fn list_pending(&self) -> Vec<PendingWake>;
    /// Called with the payload of every delivered registration.
    fn on_delivery(&self, callback: Callback<WakePayload>);
    fn authorization(&self) -> PermissionState;
    fn request_authorization(&self);
}

/// Continuous audible alert. Both calls are idempotent.
pub trait AlertSink: Send + Sync {
    fn start_continuous_alert(&self);
    fn stop_alert(&self);
}

/// Durable storage of the ordered alarm list.
pub trait PersistentStore: Send + Sync {
    fn load(&self) -> Result<Vec<Alarm>, CapabilityError>;
    fn save(&self, alarms: &[Alarm]) -> Result<(), CapabilityError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    /// The instant a local wall-clock reading denotes, under the zone
    /// rules in force on that date. `None` for readings skipped by a
    /// daylight-saving jump.
    ///
    /// The default treats the zone as fixed at `now`'s offset.
    fn resolve_local(&self, local: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        self.now().offset().from_local_datetime(&local).single()
    }
}

/// Local wall clock, following the system time zone's rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn resolve_local(&self, local: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        // A repeated hour resolves to its first occurrence.
        Local
            .from_local_datetime(&local)
            .earliest()
            .map(|t| t.fixed_offset())
    }
}

/// The full set of collaborators a controller runs against.
#[derive(Clone)]
pub struct Capabilities {
    pub position: Arc<dyn PositionSource>,
    pub notifications: Arc<dyn NotificationChannel>,
    pub alert: Arc<dyn AlertSink>,
    pub store: Arc<dyn PersistentStore>,
    pub clock: Arc<dyn Clock>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn subscribers_run_in_registration_order() {
        let subs: Subscribers<u32> = Subscribers::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            subs.subscribe(Arc::new(move |v: &u32| order.lock().unwrap().push((tag, *v))));
        }
        subs.notify(&7);
        assert_eq!(*order.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn callback_may_subscribe_without_deadlock() {
        let subs: Arc<Subscribers<()>> = Arc::new(Subscribers::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&subs);
        let counter = Arc::clone(&calls);
        subs.subscribe(Arc::new(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.subscribe(Arc::new(|_: &()| {}));
        }));
        subs.notify(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(subs.len(), 2);
    }

    #[test]
    fn system_clock_resolves_its_own_reading() {
        let now = SystemClock.now();
        let resolved = SystemClock.resolve_local(now.naive_local()).unwrap();
        // Inside a repeated hour the earlier occurrence wins.
        assert!(resolved <= now);
        assert!(now - resolved <= chrono::TimeDelta::hours(1));
    }
}
