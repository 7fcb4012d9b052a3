// ── Command API ──
//
// Every mutation of alarm state flows through a unified `Command` enum.
// The controller's command processor applies them one at a time, so
// transitions never interleave.

use std::sync::Arc;

use crate::error::CoreError;
use crate::model::{Alarm, AlarmDraft, AlarmId, WakePayload};

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All user-initiated operations on alarms.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Alarm CRUD ───────────────────────────────────────────────────
    AddAlarm { draft: AlarmDraft },
    UpdateAlarm { id: AlarmId, draft: AlarmDraft },
    ToggleAlarm { id: AlarmId },
    DeleteAlarm { id: AlarmId },

    // ── Alerting ─────────────────────────────────────────────────────
    StopAlarm { id: AlarmId },

    // ── Scheduling ───────────────────────────────────────────────────
    RescheduleAll,

    /// Replace the alarm list with records read back from storage.
    Reload { records: Vec<Alarm> },

    /// Completes once every platform signal queued before it is applied.
    Settle,
}

/// Result of a successfully executed command.
#[derive(Debug, Clone)]
pub enum CommandResult {
    Ok,
    Alarm(Arc<Alarm>),
    Deleted(AlarmId),
    Rescheduled { registered: usize, failures: usize },
    Reloaded { changed: bool },
}

/// Platform callbacks forwarded to the command processor.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Signal {
    WakeDelivered(WakePayload),
}
