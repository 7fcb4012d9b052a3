//! `watch`: keeps the controller alive so wake-ups are delivered as they
//! fall due. Alarms stopped from another shell are picked up from the
//! data file on the next tick.

use std::time::Duration;

use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use geoalarm_core::capability::memory::InMemoryChannel;
use geoalarm_core::{AlarmId, Clock, Controller, CoreError, LifecycleEvent, SystemClock};

use crate::cli::{OutputFormat, WatchArgs};
use crate::error::CliError;

use super::{RenderOpts, util};

pub async fn run(
    controller: &Controller,
    channel: &InMemoryChannel,
    args: &WatchArgs,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let mut events = controller.events();
    let mut ticker = tokio::time::interval(Duration::from_secs(args.tick));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    if !opts.global.quiet {
        eprintln!(
            "Watching {} alarm(s), press Ctrl-C to quit",
            controller.alarms_snapshot().len()
        );
    }

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => break,
            () = sleep_until(deadline) => break,
            event = events.recv() => match event {
                Ok(event) => print_event(controller, &event, opts)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => tick(controller, channel).await?,
        }
    }

    while let Ok(event) = events.try_recv() {
        print_event(controller, &event, opts)?;
    }
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Apply outside changes, then deliver everything that is due.
async fn tick(controller: &Controller, channel: &InMemoryChannel) -> Result<(), CliError> {
    match controller.reload().await {
        Ok(true) => debug!("picked up changes from the data file"),
        Ok(false) => {}
        // Unreadable right now; retry on the next tick.
        Err(e @ CoreError::PersistenceFailure { .. }) => {
            warn!(error = %e, "could not re-read alarms");
        }
        Err(e) => return Err(e.into()),
    }

    let fired = channel.fire_due(SystemClock.now());
    if !fired.is_empty() {
        debug!(fired = fired.len(), "delivered due wake-ups");
        controller.settle().await?;
    }
    Ok(())
}

// ── Event output ────────────────────────────────────────────────────

fn print_event(
    controller: &Controller,
    event: &LifecycleEvent,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let line = match opts.format {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(event)?,
        OutputFormat::Yaml => serde_yaml::to_string(std::slice::from_ref(event))?
            .trim_end()
            .to_owned(),
        OutputFormat::Plain => {
            let (kind, subject) = describe(controller, event);
            format!("{kind} {subject}")
        }
        OutputFormat::Table => {
            let (kind, subject) = describe(controller, event);
            let stamp = SystemClock.now().format("%H:%M:%S");
            format!("{stamp}  {}  {subject}", paint_kind(kind, opts.color))
        }
    };
    println!("{line}");
    Ok(())
}

/// Short label and human-readable subject of an event.
fn describe(controller: &Controller, event: &LifecycleEvent) -> (&'static str, String) {
    let name = |id: &AlarmId| {
        controller
            .alarm(id)
            .map_or_else(|| id.to_string(), |a| format!("'{}'", a.name))
    };
    match event {
        LifecycleEvent::Added { alarm_id } => ("added", name(alarm_id)),
        LifecycleEvent::Updated { alarm_id } => ("updated", name(alarm_id)),
        LifecycleEvent::Deleted { alarm_id } => ("deleted", alarm_id.to_string()),
        LifecycleEvent::Armed {
            alarm_id,
            registered,
        } => ("armed", format!("{} ({registered} wake-ups)", name(alarm_id))),
        LifecycleEvent::Disarmed { alarm_id } => ("disarmed", name(alarm_id)),
        LifecycleEvent::Alerting { alarm_id } => (
            "ringing",
            format!("{}, stop it on site with `geoalarm stop`", name(alarm_id)),
        ),
        LifecycleEvent::Stopped { alarm_id } => ("stopped", name(alarm_id)),
        LifecycleEvent::Rejected { alarm_id, reason } => {
            ("rejected", format!("{}: {reason}", name(alarm_id)))
        }
        LifecycleEvent::SchedulingFailed { .. } | LifecycleEvent::PermissionMissing { .. } => {
            ("warning", util::event_warning(event).unwrap_or_default())
        }
        LifecycleEvent::PersistenceFailed { reason } => ("unsaved", reason.clone()),
        LifecycleEvent::Rescheduled { alarms } => {
            ("rescheduled", format!("{alarms} enabled alarm(s)"))
        }
    }
}

fn paint_kind(kind: &str, color: bool) -> String {
    let padded = format!("{kind:<11}");
    if !color {
        return padded;
    }
    match kind {
        "ringing" => padded.red().bold().to_string(),
        "stopped" | "disarmed" => padded.green().to_string(),
        "warning" | "rejected" | "unsaved" => padded.yellow().to_string(),
        _ => padded.dimmed().to_string(),
    }
}
