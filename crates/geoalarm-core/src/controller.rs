// ── Alarm lifecycle controller ──
//
// Owns the alarm state machine. User commands and platform deliveries
// are funnelled into one command-processor task, which applies every
// transition against the repository and the scheduler in turn. A
// separate persistence task writes repository snapshots to the durable
// store off the async runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::{Capabilities, PermissionState};
use crate::command::{Command, CommandEnvelope, CommandResult, Signal};
use crate::config::ControllerConfig;
use crate::error::{Capability, CoreError};
use crate::geo::{GeoEvaluator, ProximityState};
use crate::model::{
    Alarm, AlarmDraft, AlarmId, AlarmState, Coordinate, LifecycleEvent, PendingWake, WakePayload,
};
use crate::scheduler::{NotificationScheduler, ScheduleReport};
use crate::store::AlarmRepository;
use crate::stream::AlarmStream;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Authorization of both platform permissions after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub location: PermissionState,
    pub notifications: PermissionState,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Call
/// [`start()`](Self::start) before issuing commands and
/// [`shutdown()`](Self::shutdown) to flush pending writes.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    caps: Capabilities,
    geo: GeoEvaluator,
    repository: Arc<AlarmRepository>,
    scheduler: NotificationScheduler,
    /// Alarms whose continuous alert is currently playing.
    alerting: DashSet<AlarmId>,
    /// Last fix pushed by the position source.
    last_position: Arc<watch::Sender<Option<Coordinate>>>,
    event_tx: broadcast::Sender<LifecycleEvent>,
    running: watch::Sender<bool>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes durable writes so an older snapshot never lands last.
    save_lock: Mutex<()>,
    saved_version: AtomicU64,
}

impl Controller {
    /// Create a controller. Does NOT load or schedule anything until
    /// [`start()`](Self::start).
    pub fn new(config: ControllerConfig, caps: Capabilities) -> Self {
        let geo = GeoEvaluator::new(config.radius_m);
        let scheduler = NotificationScheduler::new(
            Arc::clone(&caps.notifications),
            Arc::clone(&caps.clock),
            &config,
        );
        let (last_position, _) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (running, _) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(ControllerInner {
                config,
                caps,
                geo,
                repository: Arc::new(AlarmRepository::new()),
                scheduler,
                alerting: DashSet::new(),
                last_position: Arc::new(last_position),
                event_tx,
                running,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                signal_tx,
                signal_rx: Mutex::new(Some(signal_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                save_lock: Mutex::new(()),
                saved_version: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn repository(&self) -> &Arc<AlarmRepository> {
        &self.inner.repository
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Load stored alarms, hook platform callbacks, spawn the background
    /// tasks and reconcile every pending wake-up.
    pub async fn start(&self) -> Result<(), CoreError> {
        let Some(command_rx) = self.inner.command_rx.lock().await.take() else {
            return Err(CoreError::Internal("controller already started".into()));
        };
        let Some(signal_rx) = self.inner.signal_rx.lock().await.take() else {
            return Err(CoreError::Internal("controller already started".into()));
        };

        let records = load_records(&self.inner).await?;
        let loaded = self.inner.repository.load(records);
        self.inner
            .saved_version
            .store(self.inner.repository.version(), Ordering::SeqCst);
        debug!(alarms = loaded, "alarms loaded");

        self.hook_capabilities();

        {
            let mut handles = self.inner.task_handles.lock().await;
            handles.push(tokio::spawn(command_processor_task(
                Arc::clone(&self.inner),
                command_rx,
                signal_rx,
            )));
            handles.push(tokio::spawn(persistence_task(Arc::clone(&self.inner))));
        }

        self.inner.running.send_replace(true);
        self.reschedule_all().await?;
        info!(alarms = loaded, "alarm controller started");
        Ok(())
    }

    /// Stop background tasks and write any unsaved change.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        if !*self.inner.running.borrow() {
            return Ok(());
        }
        self.inner.running.send_replace(false);
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        let result = if self.is_dirty() {
            persist_latest(&self.inner).await
        } else {
            Ok(())
        };
        info!("alarm controller stopped");
        result
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    /// Ask the platform for location and notification access.
    pub fn request_permissions(&self) -> Permissions {
        self.inner.caps.position.request_permission();
        self.inner.caps.notifications.request_authorization();
        Permissions {
            location: self.inner.caps.position.permission(),
            notifications: self.inner.caps.notifications.authorization(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Send a command to the processor and wait for its result.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if !*self.inner.running.borrow() {
            return Err(CoreError::ControllerStopped);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::ControllerStopped)?;

        rx.await.map_err(|_| CoreError::ControllerStopped)?
    }

    pub async fn add(&self, draft: AlarmDraft) -> Result<Arc<Alarm>, CoreError> {
        expect_alarm(self.execute(Command::AddAlarm { draft }).await?)
    }

    pub async fn update(&self, id: AlarmId, draft: AlarmDraft) -> Result<Arc<Alarm>, CoreError> {
        expect_alarm(self.execute(Command::UpdateAlarm { id, draft }).await?)
    }

    pub async fn toggle_enabled(&self, id: AlarmId) -> Result<Arc<Alarm>, CoreError> {
        expect_alarm(self.execute(Command::ToggleAlarm { id }).await?)
    }

    pub async fn delete(&self, id: AlarmId) -> Result<(), CoreError> {
        self.execute(Command::DeleteAlarm { id }).await.map(|_| ())
    }

    pub async fn stop(&self, id: AlarmId) -> Result<Arc<Alarm>, CoreError> {
        expect_alarm(self.execute(Command::StopAlarm { id }).await?)
    }

    /// Full reconciliation of pending wake-ups with the stored alarms.
    /// Returns how many registrations were made.
    pub async fn reschedule_all(&self) -> Result<usize, CoreError> {
        match self.execute(Command::RescheduleAll).await? {
            CommandResult::Rescheduled { registered, .. } => Ok(registered),
            other => Err(unexpected(&other)),
        }
    }

    /// Re-read the durable store and apply changes another writer made
    /// to it, then reconcile wake-ups. Returns whether anything changed.
    /// An unchanged store leaves every registration in place, and so does
    /// a reload while local changes are still unsaved.
    pub async fn reload(&self) -> Result<bool, CoreError> {
        let records = load_records(&self.inner).await?;
        match self.execute(Command::Reload { records }).await? {
            CommandResult::Reloaded { changed } => Ok(changed),
            other => Err(unexpected(&other)),
        }
    }

    /// Wait until every delivery reported so far has been applied.
    pub async fn settle(&self) -> Result<(), CoreError> {
        self.execute(Command::Settle).await.map(|_| ())
    }

    /// Report a delivered wake-up that did not arrive through the
    /// channel's delivery callback.
    pub fn wake_delivered(&self, payload: WakePayload) {
        if self.inner.signal_tx.send(Signal::WakeDelivered(payload)).is_err() {
            debug!(alarm_id = %payload.alarm_id, "delivery after shutdown dropped");
        }
    }

    /// Write the current alarm list to the durable store now.
    pub async fn flush(&self) -> Result<(), CoreError> {
        persist_latest(&self.inner).await
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Freshest position: the source's current fix, else the last update.
    pub fn current_position(&self) -> Option<Coordinate> {
        self.inner.current_position()
    }

    pub fn proximity(&self, id: &AlarmId) -> Result<ProximityState, CoreError> {
        let alarm = self.inner.repository.require(id)?;
        Ok(self
            .inner
            .geo
            .proximity(self.inner.current_position(), alarm.coordinate()))
    }

    pub fn state(&self, id: &AlarmId) -> Result<AlarmState, CoreError> {
        let alarm = self.inner.repository.require(id)?;
        Ok(self.inner.state_of(&alarm))
    }

    pub fn alarm(&self, id: &AlarmId) -> Option<Arc<Alarm>> {
        self.inner.repository.get(id)
    }

    pub fn alarms_snapshot(&self) -> Arc<Vec<Arc<Alarm>>> {
        self.inner.repository.snapshot()
    }

    pub fn alarms(&self) -> AlarmStream {
        self.inner.repository.stream()
    }

    pub fn pending_for(&self, id: &AlarmId) -> Vec<PendingWake> {
        self.inner.scheduler.pending_for(id)
    }

    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.event_tx.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────

    fn hook_capabilities(&self) {
        let caps = &self.inner.caps;
        if let Some(position) = caps.position.current_position() {
            self.inner.last_position.send_replace(Some(position));
        }

        let last_position = Arc::clone(&self.inner.last_position);
        caps.position.on_update(Arc::new(move |c: &Coordinate| {
            last_position.send_replace(Some(*c));
        }));

        let signal_tx = self.inner.signal_tx.clone();
        caps.notifications
            .on_delivery(Arc::new(move |payload: &WakePayload| {
                if signal_tx.send(Signal::WakeDelivered(*payload)).is_err() {
                    debug!(alarm_id = %payload.alarm_id, "delivery after shutdown dropped");
                }
            }));
    }

    fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }
}

fn expect_alarm(result: CommandResult) -> Result<Arc<Alarm>, CoreError> {
    match result {
        CommandResult::Alarm(alarm) => Ok(alarm),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(result: &CommandResult) -> CoreError {
    CoreError::Internal(format!("unexpected command result: {result:?}"))
}

// ── State machine ────────────────────────────────────────────────

impl ControllerInner {
    fn current_position(&self) -> Option<Coordinate> {
        self.caps
            .position
            .current_position()
            .or(*self.last_position.borrow())
    }

    fn state_of(&self, alarm: &Alarm) -> AlarmState {
        if !alarm.enabled {
            AlarmState::Disabled
        } else if self.alerting.contains(&alarm.id) {
            AlarmState::Alerting
        } else if self.scheduler.is_repeating(&alarm.id) {
            AlarmState::Armed
        } else {
            AlarmState::Dormant
        }
    }

    fn is_dirty(&self) -> bool {
        self.repository.version() != self.saved_version.load(Ordering::SeqCst)
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Proximity gate for update, toggle, delete and stop. Always judged
    /// against the stored coordinate and the freshest position.
    fn gate(&self, alarm: &Alarm) -> Result<(), CoreError> {
        let result = self.check_proximity(alarm);
        if let Err(e) = &result {
            debug!(alarm_id = %alarm.id, error = %e, "request rejected by proximity gate");
            self.emit(LifecycleEvent::Rejected {
                alarm_id: alarm.id,
                reason: e.to_string(),
            });
        }
        result
    }

    fn check_proximity(&self, alarm: &Alarm) -> Result<(), CoreError> {
        if self.caps.position.permission() == PermissionState::Denied {
            return Err(CoreError::PermissionDenied {
                capability: Capability::Location,
            });
        }
        let verdict = self
            .geo
            .verdict(self.current_position(), alarm.coordinate())
            .ok_or(CoreError::PositionUnavailable)?;
        if verdict.in_range {
            Ok(())
        } else {
            Err(CoreError::ProximityDenied {
                alarm_id: alarm.id,
                distance_m: verdict.distance_m,
                radius_m: verdict.radius_m,
            })
        }
    }

    /// Schedule today's batch; keep an already ringing alarm ringing.
    fn arm(&self, alarm: &Alarm) {
        let mut report = self.scheduler.schedule(alarm);
        if self.alerting.contains(&alarm.id) {
            report.merge(self.scheduler.resume(alarm));
        }
        if report.registered > 0 {
            self.emit(LifecycleEvent::Armed {
                alarm_id: alarm.id,
                registered: report.registered,
            });
        }
        self.report_schedule(report);
    }

    fn disarm(&self, id: &AlarmId) {
        self.scheduler.cancel(id);
        self.silence(id);
        self.emit(LifecycleEvent::Disarmed { alarm_id: *id });
    }

    /// Leave `Alerting`; the shared alert stops once nothing rings.
    fn silence(&self, id: &AlarmId) -> bool {
        let was_alerting = self.alerting.remove(id).is_some();
        if was_alerting && self.alerting.is_empty() {
            self.caps.alert.stop_alert();
        }
        was_alerting
    }

    fn report_schedule(&self, report: ScheduleReport) {
        if report.unauthorized {
            warn!("notifications are not authorized, enabled alarms stay dormant");
            self.emit(LifecycleEvent::PermissionMissing {
                capability: Capability::Notification,
            });
        }
        for failure in report.failures {
            if let CoreError::SchedulingFailure { event_id, reason } = failure {
                self.emit(LifecycleEvent::SchedulingFailed { event_id, reason });
            }
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    fn add(&self, draft: AlarmDraft) -> Result<CommandResult, CoreError> {
        let alarm = self.repository.insert(Alarm::from_draft(draft)?)?;
        info!(alarm_id = %alarm.id, name = %alarm.name, time = %alarm.time_of_day, "alarm added");
        self.emit(LifecycleEvent::Added { alarm_id: alarm.id });
        self.arm(&alarm);
        Ok(CommandResult::Alarm(alarm))
    }

    fn update(&self, id: AlarmId, draft: AlarmDraft) -> Result<CommandResult, CoreError> {
        let current = self.repository.require(&id)?;
        self.gate(&current)?;

        let alarm = self.repository.replace(current.with_draft(draft)?)?;
        info!(alarm_id = %id, "alarm updated");
        self.emit(LifecycleEvent::Updated { alarm_id: id });

        self.scheduler.cancel(&id);
        if alarm.enabled {
            self.arm(&alarm);
        } else {
            self.silence(&id);
            self.emit(LifecycleEvent::Disarmed { alarm_id: id });
        }
        Ok(CommandResult::Alarm(alarm))
    }

    fn toggle(&self, id: AlarmId) -> Result<CommandResult, CoreError> {
        let current = self.repository.require(&id)?;
        self.gate(&current)?;

        let alarm = self.repository.replace(Alarm {
            enabled: !current.enabled,
            ..Alarm::clone(&current)
        })?;
        info!(alarm_id = %id, enabled = alarm.enabled, "alarm toggled");

        if alarm.enabled {
            self.scheduler.cancel(&id);
            self.arm(&alarm);
        } else {
            self.disarm(&id);
        }
        Ok(CommandResult::Alarm(alarm))
    }

    fn delete(&self, id: AlarmId) -> Result<CommandResult, CoreError> {
        let current = self.repository.require(&id)?;
        self.gate(&current)?;

        self.repository.remove(&id)?;
        self.scheduler.cancel(&id);
        self.silence(&id);
        info!(alarm_id = %id, "alarm deleted");
        self.emit(LifecycleEvent::Deleted { alarm_id: id });
        Ok(CommandResult::Deleted(id))
    }

    fn stop(&self, id: AlarmId) -> Result<CommandResult, CoreError> {
        let current = self.repository.require(&id)?;
        self.gate(&current)?;

        let alarm = self.repository.replace(Alarm {
            enabled: false,
            ..Alarm::clone(&current)
        })?;
        self.scheduler.cancel(&id);
        self.silence(&id);
        info!(alarm_id = %id, "alarm stopped on site");
        self.emit(LifecycleEvent::Stopped { alarm_id: id });
        Ok(CommandResult::Alarm(alarm))
    }

    fn reschedule_all(&self) -> CommandResult {
        let snapshot = self.repository.snapshot();
        let mut report = self.scheduler.reschedule_all(&snapshot);

        let ringing: Vec<AlarmId> = self.alerting.iter().map(|id| *id).collect();
        for id in ringing {
            match self.repository.get(&id) {
                Some(alarm) if alarm.enabled => report.merge(self.scheduler.resume(&alarm)),
                _ => {
                    self.silence(&id);
                    self.emit(LifecycleEvent::Disarmed { alarm_id: id });
                }
            }
        }

        let enabled = snapshot.iter().filter(|a| a.enabled).count();
        let (registered, failures) = (report.registered, report.failures.len());
        self.report_schedule(report);
        self.emit(LifecycleEvent::Rescheduled { alarms: enabled });
        CommandResult::Rescheduled {
            registered,
            failures,
        }
    }

    fn reload(&self, records: Vec<Alarm>) -> CommandResult {
        // Local changes not yet written win over the store.
        if self.is_dirty() {
            debug!("unsaved changes pending, reload skipped");
            return CommandResult::Reloaded { changed: false };
        }
        let incoming = AlarmRepository::new();
        incoming.load(records);
        let records = incoming.records();
        if records == self.repository.records() {
            return CommandResult::Reloaded { changed: false };
        }

        let loaded = self.repository.load(records);
        self.saved_version
            .store(self.repository.version(), Ordering::SeqCst);
        info!(alarms = loaded, "alarms reloaded from store");
        self.reschedule_all();
        CommandResult::Reloaded { changed: true }
    }

    fn wake_delivered(&self, payload: WakePayload) {
        let id = payload.alarm_id;
        let Some(alarm) = self.repository.get(&id).filter(|a| a.enabled) else {
            debug!(alarm_id = %id, "delivery for unknown or disabled alarm ignored");
            self.scheduler.cancel(&id);
            return;
        };

        if self.alerting.insert(id) {
            info!(alarm_id = %id, name = %alarm.name, "alarm ringing");
            self.emit(LifecycleEvent::Alerting { alarm_id: id });
        }
        self.caps.alert.start_continuous_alert();

        let report = self
            .scheduler
            .on_delivered(&payload, |id| self.repository.get(id));
        self.report_schedule(report);
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Single owner of every transition. Platform signals take priority so
/// a command issued after a delivery observes its effect.
async fn command_processor_task(
    inner: Arc<ControllerInner>,
    mut commands: mpsc::Receiver<CommandEnvelope>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
) {
    let cancel = inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(signal) = signals.recv() => match signal {
                Signal::WakeDelivered(payload) => inner.wake_delivered(payload),
            },
            envelope = commands.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&inner, envelope.command);
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

fn route_command(inner: &ControllerInner, cmd: Command) -> Result<CommandResult, CoreError> {
    match cmd {
        Command::AddAlarm { draft } => inner.add(draft),
        Command::UpdateAlarm { id, draft } => inner.update(id, draft),
        Command::ToggleAlarm { id } => inner.toggle(id),
        Command::DeleteAlarm { id } => inner.delete(id),
        Command::StopAlarm { id } => inner.stop(id),
        Command::RescheduleAll => Ok(inner.reschedule_all()),
        Command::Reload { records } => Ok(inner.reload(records)),
        Command::Settle => Ok(CommandResult::Ok),
    }
}

/// Writes every repository change to the durable store. Bursts of
/// changes coalesce into one write of the latest list.
async fn persistence_task(inner: Arc<ControllerInner>) {
    let cancel = inner.cancel.clone();
    let mut rx = inner.repository.subscribe();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // Reloaded lists are already on disk.
                if !inner.is_dirty() {
                    continue;
                }
                if let Err(e) = persist_latest(&inner).await {
                    warn!(error = %e, "failed to persist alarms");
                    inner.emit(LifecycleEvent::PersistenceFailed { reason: e.to_string() });
                }
            }
        }
    }
}

async fn load_records(inner: &ControllerInner) -> Result<Vec<Alarm>, CoreError> {
    let store = Arc::clone(&inner.caps.store);
    tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|e| CoreError::Internal(format!("load task failed: {e}")))?
        .map_err(|e| CoreError::PersistenceFailure {
            reason: e.to_string(),
        })
}

async fn persist_latest(inner: &ControllerInner) -> Result<(), CoreError> {
    let _guard = inner.save_lock.lock().await;
    let version = inner.repository.version();
    let records = inner.repository.records();
    let store = Arc::clone(&inner.caps.store);

    tokio::task::spawn_blocking(move || store.save(&records))
        .await
        .map_err(|e| CoreError::Internal(format!("save task failed: {e}")))?
        .map_err(|e| CoreError::PersistenceFailure {
            reason: e.to_string(),
        })?;

    inner.saved_version.store(version, Ordering::SeqCst);
    debug!(version, "alarms persisted");
    Ok(())
}
