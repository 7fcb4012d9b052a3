mod alert;
mod cli;
mod commands;
mod error;
mod output;

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use geoalarm_config::Config;
use geoalarm_core::capability::memory::{InMemoryChannel, ManualPositionSource};
use geoalarm_core::{Capabilities, Controller, JsonFileStore, SystemClock};

use crate::alert::TerminalAlert;
use crate::cli::{Cli, Command, GlobalOpts, OutputFormat};
use crate::commands::RenderOpts;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a controller
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "geoalarm", &mut std::io::stdout());
            Ok(())
        }

        // Everything else runs against a started controller
        cmd => {
            let cfg = load_config(&cli.global)?;
            let color = output::should_color(cli.global.color);
            let (controller, channel) = build_controller(&cfg, &cli.global, color)?;
            controller.start().await?;

            let opts = RenderOpts {
                global: &cli.global,
                format: resolve_format(&cli.global, &cfg),
                color,
            };
            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &controller, &channel, &opts).await;

            // Always flush, even when the command itself failed.
            let flushed = controller.shutdown().await;
            result?;
            flushed?;
            Ok(())
        }
    }
}

fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(geoalarm_config::config_path);
    Ok(geoalarm_config::load_config_from(&path)?)
}

/// `--output` wins, then `defaults.output` from the config.
fn resolve_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&cfg.defaults.output, true).unwrap_or(OutputFormat::Table)
    })
}

/// Wire a controller over the JSON data file and in-process capabilities.
/// The channel is returned too: `watch` fires its due wake-ups.
fn build_controller(
    cfg: &Config,
    global: &GlobalOpts,
    color: bool,
) -> Result<(Controller, Arc<InMemoryChannel>), CliError> {
    let controller_config = cfg.to_controller_config()?;
    let data_file = global
        .data_file
        .clone()
        .unwrap_or_else(|| cfg.data_file_path());
    tracing::debug!(data_file = %data_file.display(), "using alarm data file");

    let position = global
        .at
        .map_or_else(ManualPositionSource::new, ManualPositionSource::with_position);

    let channel = Arc::new(InMemoryChannel::with_ceiling(
        controller_config.pending_ceiling,
    ));
    let caps = Capabilities {
        position: Arc::new(position),
        notifications: channel.clone(),
        alert: Arc::new(TerminalAlert::new(color)),
        store: Arc::new(JsonFileStore::new(data_file)),
        clock: Arc::new(SystemClock),
    };
    Ok((Controller::new(controller_config, caps), channel))
}
