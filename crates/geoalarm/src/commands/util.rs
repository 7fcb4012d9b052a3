//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;

use owo_colors::OwoColorize;
use tokio::sync::broadcast;

use geoalarm_core::{Alarm, Capability, Controller, CoreError, LifecycleEvent};

use crate::error::CliError;

/// Shortest ID prefix accepted in place of a full alarm ID.
const MIN_PREFIX_LEN: usize = 4;

/// Resolve an alarm identifier: full ID, unique ID prefix, or exact name.
pub fn resolve_alarm(controller: &Controller, identifier: &str) -> Result<Arc<Alarm>, CliError> {
    let snap = controller.alarms_snapshot();
    let needle = identifier.trim();

    if let Some(alarm) = snap.iter().find(|a| a.id.to_string() == needle) {
        return Ok(Arc::clone(alarm));
    }

    let mut matches: Vec<&Arc<Alarm>> = if needle.len() >= MIN_PREFIX_LEN {
        let prefix = needle.to_ascii_lowercase();
        snap.iter()
            .filter(|a| a.id.to_string().starts_with(&prefix))
            .collect()
    } else {
        Vec::new()
    };
    if matches.is_empty() {
        matches = snap.iter().filter(|a| a.name == needle).collect();
    }

    match matches.as_slice() {
        [] => Err(CliError::NotFound {
            identifier: identifier.into(),
        }),
        [alarm] => Ok(Arc::clone(alarm)),
        many => Err(CliError::Ambiguous {
            identifier: identifier.into(),
            count: many.len(),
        }),
    }
}

/// Short form of an alarm ID for table output.
pub fn short_id(alarm: &Alarm) -> String {
    alarm.id.to_string().chars().take(8).collect()
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// What a missing platform permission blocks, and how to grant it.
pub fn permission_hint(capability: Capability) -> String {
    let remedy = CoreError::PermissionDenied { capability }
        .remediation()
        .unwrap_or_default();
    format!("{capability} permission missing, alarms stay dormant. {remedy}")
}

/// Warning text for an event reporting a side effect that did not happen.
pub fn event_warning(event: &LifecycleEvent) -> Option<String> {
    match event {
        LifecycleEvent::PermissionMissing { capability } => Some(permission_hint(*capability)),
        LifecycleEvent::SchedulingFailed { event_id, reason } => {
            Some(format!("Wake-up {event_id} was not scheduled: {reason}"))
        }
        _ => None,
    }
}

/// Print a warning for every failed side effect queued on `events`.
pub fn warn_side_effects(events: &mut broadcast::Receiver<LifecycleEvent>, color: bool) {
    while let Ok(event) = events.try_recv() {
        let Some(message) = event_warning(&event) else {
            continue;
        };
        if color {
            eprintln!("{} {message}", "warning:".yellow().bold());
        } else {
            eprintln!("warning: {message}");
        }
    }
}
