//! Command dispatch: routes each CLI subcommand to its handler.

pub mod alarms;
pub mod config_cmd;
pub mod util;
pub mod watch;

use geoalarm_core::Controller;
use geoalarm_core::capability::memory::InMemoryChannel;

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Resolved presentation settings shared by every handler.
pub struct RenderOpts<'a> {
    pub global: &'a GlobalOpts,
    pub format: OutputFormat,
    pub color: bool,
}

/// Dispatch an alarm command against a started controller. `channel`
/// is the notification channel the controller schedules on.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    channel: &InMemoryChannel,
    opts: &RenderOpts<'_>,
) -> Result<(), CliError> {
    match cmd {
        Command::List => alarms::list(controller, opts),
        Command::Show(target) => alarms::show(controller, &target, opts),
        Command::Add(args) => alarms::add(controller, args, opts).await,
        Command::Edit(args) => alarms::edit(controller, args, opts).await,
        Command::Toggle(target) => alarms::toggle(controller, &target, opts).await,
        Command::Delete(target) => alarms::delete(controller, &target, opts).await,
        Command::Stop(target) => alarms::stop(controller, &target, opts).await,
        Command::Distance(target) => alarms::distance(controller, &target, opts),
        Command::Watch(args) => watch::run(controller, channel, &args, opts).await,
        // Config and Completions are handled before a controller exists
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal {
            message: "command does not need the alarm controller".into(),
        }),
    }
}
