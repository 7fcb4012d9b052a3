//! Alarm command handlers.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tabled::Tabled;

use geoalarm_core::{
    Alarm, AlarmDraft, AlarmId, AlarmState, Controller, Coordinate, ProximityState,
};

use crate::cli::{AddArgs, AlarmRef, EditArgs};
use crate::error::CliError;
use crate::output;

use super::{RenderOpts, util};

// ── Views ───────────────────────────────────────────────────────────

/// An alarm plus what the controller currently knows about it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlarmView {
    #[serde(flatten)]
    alarm: Arc<Alarm>,
    state: AlarmState,
    pending_wakes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_wake: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_range: Option<bool>,
}

impl AlarmView {
    fn build(controller: &Controller, alarm: Arc<Alarm>) -> Result<Self, CliError> {
        let state = controller.state(&alarm.id)?;
        let pending = controller.pending_for(&alarm.id);
        let verdict = controller.proximity(&alarm.id)?.verdict;
        Ok(Self {
            state,
            pending_wakes: pending.len(),
            next_wake: pending.iter().map(|p| p.fire_at).min(),
            distance_m: verdict.map(|v| v.distance_m),
            in_range: verdict.map(|v| v.in_range),
            alarm,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DistanceView {
    id: AlarmId,
    name: String,
    target: Coordinate,
    #[serde(flatten)]
    proximity: ProximityState,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AlarmRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Wake-ups")]
    pending: String,
    #[tabled(rename = "Distance")]
    distance: String,
}

impl From<&AlarmView> for AlarmRow {
    fn from(v: &AlarmView) -> Self {
        Self {
            id: util::short_id(&v.alarm),
            name: v.alarm.name.clone(),
            time: v.alarm.time_of_day.to_string(),
            location: v.alarm.address_hint.clone().unwrap_or_else(|| {
                format!("{:.5}, {:.5}", v.alarm.latitude, v.alarm.longitude)
            }),
            state: v.state.to_string(),
            pending: v.pending_wakes.to_string(),
            distance: format_distance(v.distance_m),
        }
    }
}

fn format_distance(distance_m: Option<f64>) -> String {
    match distance_m {
        None => "-".into(),
        Some(d) if d >= 10_000.0 => format!("{:.1} km", d / 1000.0),
        Some(d) => format!("{d:.0} m"),
    }
}

fn detail(v: &AlarmView, color: bool) -> String {
    let a = &v.alarm;
    let next = v
        .next_wake
        .map_or_else(String::new, |t| format!(", next at {}", t.format("%Y-%m-%d %H:%M:%S %:z")));
    let proximity = match (v.distance_m, v.in_range) {
        (Some(d), Some(in_range)) => format!(
            "{} ({})",
            format_distance(Some(d)),
            output::paint_range(in_range, color)
        ),
        _ => "unknown (pass --at LAT,LON)".into(),
    };
    [
        format!("ID:        {}", a.id),
        format!("Name:      {}", a.name),
        format!("Time:      {}", a.time_of_day),
        format!("Location:  {}", a.coordinate()),
        format!("Address:   {}", a.address_hint.as_deref().unwrap_or("-")),
        format!("Enabled:   {}", if a.enabled { "yes" } else { "no" }),
        format!("State:     {}", output::paint_state(v.state, color)),
        format!("Wake-ups:  {}{next}", v.pending_wakes),
        format!("Distance:  {proximity}"),
    ]
    .join("\n")
}

fn distance_detail(v: &DistanceView, color: bool) -> String {
    let position = v
        .proximity
        .position
        .map_or_else(|| "unknown".into(), |p| p.to_string());
    let mut lines = vec![
        format!("Alarm:     {} ({})", v.name, v.id),
        format!("Target:    {}", v.target),
        format!("Position:  {position}"),
    ];
    match v.proximity.verdict {
        Some(verdict) => {
            lines.push(format!("Distance:  {}", format_distance(Some(verdict.distance_m))));
            lines.push(format!("Radius:    {:.0} m", verdict.radius_m));
            lines.push(format!(
                "Verdict:   {}",
                output::paint_range(verdict.in_range, color)
            ));
        }
        None => lines.push("Distance:  unknown (pass --at LAT,LON)".into()),
    }
    lines.join("\n")
}

fn print_view(view: &AlarmView, opts: &RenderOpts<'_>) -> Result<(), CliError> {
    let out = output::render_single(
        opts.format,
        view,
        |v| detail(v, opts.color),
        |v| v.alarm.id.to_string(),
    )?;
    output::print_output(&out, opts.global.quiet);
    Ok(())
}

fn notice(opts: &RenderOpts<'_>, message: &str) {
    if !opts.global.quiet {
        eprintln!("{message}");
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn list(controller: &Controller, opts: &RenderOpts<'_>) -> Result<(), CliError> {
    let views = controller
        .alarms_snapshot()
        .iter()
        .map(|a| AlarmView::build(controller, Arc::clone(a)))
        .collect::<Result<Vec<_>, _>>()?;
    let out = output::render_list(
        opts.format,
        &views,
        |v| AlarmRow::from(v),
        |v| v.alarm.id.to_string(),
    )?;
    output::print_output(&out, opts.global.quiet);
    Ok(())
}

pub fn show(
    controller: &Controller,
    target: &AlarmRef,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let alarm = util::resolve_alarm(controller, &target.alarm)?;
    print_view(&AlarmView::build(controller, alarm)?, opts)
}

pub async fn add(
    controller: &Controller,
    args: AddArgs,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let mut draft = AlarmDraft::new(args.name, args.time, args.location);
    if let Some(address) = args.address {
        draft = draft.with_address_hint(address);
    }
    let mut events = controller.events();
    let alarm = controller.add(draft).await?;
    util::warn_side_effects(&mut events, opts.color);
    notice(opts, &format!("Alarm '{}' created", alarm.name));
    print_view(&AlarmView::build(controller, alarm)?, opts)
}

pub async fn edit(
    controller: &Controller,
    args: EditArgs,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let current = util::resolve_alarm(controller, &args.alarm)?;
    let mut draft = current.to_draft();
    if let Some(name) = args.name {
        draft.name = name;
    }
    if let Some(time) = args.time {
        draft.time_of_day = time;
    }
    if let Some(location) = args.location {
        draft.coordinate = location;
    }
    if let Some(address) = args.address {
        draft.address_hint = Some(address);
    }
    if args.clear_address {
        draft.address_hint = None;
    }
    if let Some(enabled) = args.enabled {
        draft.enabled = enabled;
    }
    if draft == current.to_draft() {
        return Err(CliError::Validation {
            field: "edit".into(),
            reason: "nothing to change; pass --name, --time, --location, --address or --enabled"
                .into(),
        });
    }

    let mut events = controller.events();
    let alarm = controller.update(current.id, draft).await?;
    util::warn_side_effects(&mut events, opts.color);
    notice(opts, &format!("Alarm '{}' updated", alarm.name));
    print_view(&AlarmView::build(controller, alarm)?, opts)
}

pub async fn toggle(
    controller: &Controller,
    target: &AlarmRef,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let current = util::resolve_alarm(controller, &target.alarm)?;
    let mut events = controller.events();
    let alarm = controller.toggle_enabled(current.id).await?;
    util::warn_side_effects(&mut events, opts.color);
    let verb = if alarm.enabled { "enabled" } else { "disabled" };
    notice(opts, &format!("Alarm '{}' {verb}", alarm.name));
    print_view(&AlarmView::build(controller, alarm)?, opts)
}

pub async fn delete(
    controller: &Controller,
    target: &AlarmRef,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let alarm = util::resolve_alarm(controller, &target.alarm)?;
    if !util::confirm(
        &format!("Delete alarm '{}'? This cannot be undone.", alarm.name),
        "delete",
        opts.global.yes,
    )? {
        return Ok(());
    }
    controller.delete(alarm.id).await?;
    notice(opts, &format!("Alarm '{}' deleted", alarm.name));
    Ok(())
}

pub async fn stop(
    controller: &Controller,
    target: &AlarmRef,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let current = util::resolve_alarm(controller, &target.alarm)?;
    let alarm = controller.stop(current.id).await?;
    notice(opts, &format!("Alarm '{}' stopped", alarm.name));
    print_view(&AlarmView::build(controller, alarm)?, opts)
}

pub fn distance(
    controller: &Controller,
    target: &AlarmRef,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    let alarm = util::resolve_alarm(controller, &target.alarm)?;
    let view = DistanceView {
        id: alarm.id,
        name: alarm.name.clone(),
        target: alarm.coordinate(),
        proximity: controller.proximity(&alarm.id)?,
    };
    let out = output::render_single(
        opts.format,
        &view,
        |v| distance_detail(v, opts.color),
        |v| {
            v.proximity
                .verdict
                .map_or_else(|| "unknown".into(), |verdict| format!("{:.1}", verdict.distance_m))
        },
    )?;
    output::print_output(&out, opts.global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances_switch_to_kilometres() {
        assert_eq!(format_distance(None), "-");
        assert_eq!(format_distance(Some(80.4)), "80 m");
        assert_eq!(format_distance(Some(12_345.0)), "12.3 km");
    }
}
