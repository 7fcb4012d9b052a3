//! Config subcommand handlers.

use std::path::PathBuf;

use geoalarm_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

/// Format the resolved config, including the effective data file.
fn format_config(cfg: &Config, data_file: &std::path::Path) -> Result<String, CliError> {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "# effective data file: {}", data_file.display());
    out.push_str(&toml::to_string_pretty(cfg).map_err(|e| CliError::Internal {
        message: e.to_string(),
    })?);
    Ok(out.trim_end().to_owned())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load_config_from(&config_file(global))?;
            let data_file = global
                .data_file
                .clone()
                .unwrap_or_else(|| cfg.data_file_path());
            output::print_output(&format_config(&cfg, &data_file)?, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = config_file(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config_to(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config_file(global).display().to_string(), global.quiet);
            Ok(())
        }
    }
}
