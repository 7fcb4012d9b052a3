//! Clap derive structures for the `geoalarm` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use geoalarm_core::{Coordinate, TimeOfDay};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// geoalarm -- alarms you can only silence at the place you set them for
#[derive(Debug, Parser)]
#[command(
    name = "geoalarm",
    version,
    about = "Manage proximity-gated alarms from the command line",
    long_about = "Time-of-day alarms bound to a place.\n\n\
        Editing, disabling, deleting or stopping an alarm is only allowed\n\
        while the reported position (--at LAT,LON) is within the configured\n\
        radius of the alarm's coordinate.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "GEOALARM_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Alarm data file (overrides `data_file` from the config)
    #[arg(long, env = "GEOALARM_DATA_FILE", global = true)]
    pub data_file: Option<PathBuf>,

    /// Current position as LAT,LON
    #[arg(long, env = "GEOALARM_AT", global = true, allow_hyphen_values = true)]
    pub at: Option<Coordinate>,

    /// Output format (defaults to `defaults.output` from the config)
    #[arg(long, short = 'o', env = "GEOALARM_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all alarms in insertion order
    #[command(alias = "ls")]
    List,

    /// Show one alarm with its state and pending wake-ups
    Show(AlarmRef),

    /// Create a new, enabled alarm (no position required)
    Add(AddArgs),

    /// Edit an alarm (must be within range)
    Edit(EditArgs),

    /// Enable or disable an alarm (must be within range)
    Toggle(AlarmRef),

    /// Delete an alarm (must be within range)
    #[command(alias = "rm")]
    Delete(AlarmRef),

    /// Stop a ringing alarm and disable it (must be within range)
    Stop(AlarmRef),

    /// Stay running: ring alarms when they fall due and pick up stops
    /// made from another shell
    Watch(WatchArgs),

    /// Distance from the current position to an alarm
    #[command(alias = "dist")]
    Distance(AlarmRef),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Alarm arguments ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlarmRef {
    /// Alarm ID, unique ID prefix, or exact name
    pub alarm: String,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Display name
    pub name: String,

    /// Local time of day, HH:MM
    #[arg(long, short = 't')]
    pub time: TimeOfDay,

    /// Alarm location as LAT,LON
    #[arg(long, short = 'l', allow_hyphen_values = true)]
    pub location: Coordinate,

    /// Human-readable address shown next to the coordinate
    #[arg(long)]
    pub address: Option<String>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Alarm ID, unique ID prefix, or exact name
    pub alarm: String,

    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    /// New time of day, HH:MM
    #[arg(long, short = 't')]
    pub time: Option<TimeOfDay>,

    /// New location as LAT,LON
    #[arg(long, short = 'l', allow_hyphen_values = true)]
    pub location: Option<Coordinate>,

    /// New address hint
    #[arg(long, conflicts_with = "clear_address")]
    pub address: Option<String>,

    /// Remove the address hint
    #[arg(long)]
    pub clear_address: bool,

    /// Enable or disable in the same edit
    #[arg(long)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between checks for due wake-ups and data file changes
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick: u64,

    /// Quit after this many seconds instead of waiting for Ctrl-C
    #[arg(long = "for", value_name = "SECS")]
    pub duration: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current resolved configuration
    Show,

    /// Write a config file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
