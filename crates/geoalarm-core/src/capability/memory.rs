// ── In-memory capabilities ──
//
// Deterministic, process-local implementations of every capability.
// The CLI runs on them and the test-suite drives them by hand: push a
// fix, fire due notifications, inject failures, move the clock.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, FixedOffset, TimeDelta};

use super::{
    AlertSink, Callback, Clock, NotificationChannel, PermissionState, PersistentStore,
    PositionSource, Subscribers, lock,
};
use crate::error::CapabilityError;
use crate::model::{Alarm, Coordinate, PendingWake, WakePayload, WakeRegistration};

// ── Position ────────────────────────────────────────────────────────

/// Position source fed by hand.
pub struct ManualPositionSource {
    position: Mutex<Option<Coordinate>>,
    permission: Mutex<PermissionState>,
    subscribers: Subscribers<Coordinate>,
}

impl ManualPositionSource {
    /// Granted, but without a fix yet.
    pub fn new() -> Self {
        Self {
            position: Mutex::new(None),
            permission: Mutex::new(PermissionState::Granted),
            subscribers: Subscribers::new(),
        }
    }

    pub fn with_position(position: Coordinate) -> Self {
        let source = Self::new();
        *lock(&source.position) = Some(position);
        source
    }

    /// Record a new fix and notify subscribers.
    pub fn push(&self, position: Coordinate) {
        *lock(&self.position) = Some(position);
        self.subscribers.notify(&position);
    }

    /// Forget the current fix without notifying anyone.
    pub fn clear(&self) {
        *lock(&self.position) = None;
    }

    pub fn set_permission(&self, state: PermissionState) {
        *lock(&self.permission) = state;
    }
}

impl Default for ManualPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSource for ManualPositionSource {
    fn current_position(&self) -> Option<Coordinate> {
        *lock(&self.position)
    }

    fn on_update(&self, callback: Callback<Coordinate>) {
        self.subscribers.subscribe(callback);
    }

    fn request_permission(&self) {
        let mut state = lock(&self.permission);
        if *state == PermissionState::NotDetermined {
            *state = PermissionState::Granted;
        }
    }

    fn permission(&self) -> PermissionState {
        *lock(&self.permission)
    }
}

// ── Notifications ───────────────────────────────────────────────────

#[derive(Default)]
struct ChannelState {
    pending: Vec<WakeRegistration>,
    failing_ids: HashSet<String>,
    fail_next: usize,
}

/// Notification channel that holds registrations in memory until
/// [`fire_due`](Self::fire_due) delivers them.
pub struct InMemoryChannel {
    state: Mutex<ChannelState>,
    ceiling: Option<usize>,
    authorization: Mutex<PermissionState>,
    subscribers: Subscribers<WakePayload>,
    delivered: AtomicUsize,
}

impl InMemoryChannel {
    /// Authorized channel without a pending limit.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            ceiling: None,
            authorization: Mutex::new(PermissionState::Granted),
            subscribers: Subscribers::new(),
            delivered: AtomicUsize::new(0),
        }
    }

    /// Reject registrations once `ceiling` are pending.
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            ceiling: Some(ceiling),
            ..Self::new()
        }
    }

    pub fn set_authorization(&self, state: PermissionState) {
        *lock(&self.authorization) = state;
    }

    /// Make the next `n` registrations fail.
    pub fn fail_next(&self, n: usize) {
        lock(&self.state).fail_next = n;
    }

    /// Make every registration of `event_id` fail.
    pub fn fail_event(&self, event_id: impl Into<String>) {
        lock(&self.state).failing_ids.insert(event_id.into());
    }

    /// Deliver, in fire order, every registration due at `now`. Returns
    /// the delivered registrations.
    pub fn fire_due(&self, now: DateTime<FixedOffset>) -> Vec<PendingWake> {
        let due = {
            let mut state = lock(&self.state);
            let (mut due, keep): (Vec<_>, Vec<_>) =
                state.pending.drain(..).partition(|r| r.fire_at <= now);
            state.pending = keep;
            due.sort_by_key(|r| r.fire_at);
            due
        };
        for registration in &due {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.subscribers.notify(&registration.payload);
        }
        due.iter().map(PendingWake::from).collect()
    }

    /// Deliver a payload that is not (or no longer) pending, as a
    /// platform may do for a notification already on screen.
    pub fn deliver(&self, payload: WakePayload) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        self.subscribers.notify(&payload);
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.state).pending.len()
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationChannel for InMemoryChannel {
    fn register(&self, registration: &WakeRegistration) -> Result<(), CapabilityError> {
        if !lock(&self.authorization).is_granted() {
            return Err(CapabilityError::PermissionRevoked);
        }

        let mut state = lock(&self.state);
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(CapabilityError::Unavailable("injected failure".into()));
        }
        if state.failing_ids.contains(&registration.event_id) {
            return Err(CapabilityError::Unavailable("injected failure".into()));
        }

        // Same id replaces, as platform notification centers do.
        if let Some(existing) = state
            .pending
            .iter_mut()
            .find(|r| r.event_id == registration.event_id)
        {
            *existing = registration.clone();
            return Ok(());
        }

        if let Some(limit) = self.ceiling {
            if state.pending.len() >= limit {
                return Err(CapabilityError::Capacity { limit });
            }
        }
        state.pending.push(registration.clone());
        Ok(())
    }

    fn revoke(&self, event_id: &str) {
        lock(&self.state).pending.retain(|r| r.event_id != event_id);
    }

    fn revoke_all(&self) {
        lock(&self.state).pending.clear();
    }

    fn list_pending(&self) -> Vec<PendingWake> {
        let mut pending: Vec<PendingWake> =
            lock(&self.state).pending.iter().map(PendingWake::from).collect();
        pending.sort_by_key(|p| p.fire_at);
        pending
    }

    fn on_delivery(&self, callback: Callback<WakePayload>) {
        self.subscribers.subscribe(callback);
    }

    fn authorization(&self) -> PermissionState {
        *lock(&self.authorization)
    }

    fn request_authorization(&self) {
        let mut state = lock(&self.authorization);
        if *state == PermissionState::NotDetermined {
            *state = PermissionState::Granted;
        }
    }
}

// ── Alert ───────────────────────────────────────────────────────────

/// Alert sink that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingAlertSink {
    active: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AlertSink for RecordingAlertSink {
    fn start_continuous_alert(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
    }

    fn stop_alert(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Store backed by a vector.
#[derive(Default)]
pub struct MemoryStore {
    alarms: Mutex<Vec<Alarm>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alarms(alarms: Vec<Alarm>) -> Self {
        Self {
            alarms: Mutex::new(alarms),
            ..Self::default()
        }
    }

    /// Make every following save fail until reset.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// What the last successful save wrote.
    pub fn saved(&self) -> Vec<Alarm> {
        lock(&self.alarms).clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self) -> Result<Vec<Alarm>, CapabilityError> {
        Ok(lock(&self.alarms).clone())
    }

    fn save(&self, alarms: &[Alarm]) -> Result<(), CapabilityError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CapabilityError::Io("injected save failure".into()));
        }
        *lock(&self.alarms) = alarms.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Clock ───────────────────────────────────────────────────────────

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *lock(&self.now)
    }
}
