//! Shared configuration for the geoalarm tools.
//!
//! TOML file plus `GEOALARM_` environment overrides, platform paths for
//! the config and alarm data files, and translation to
//! `geoalarm_core::ControllerConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use geoalarm_core::ControllerConfig;

/// Prefix of environment overrides. Nested keys use `__`, e.g.
/// `GEOALARM_ALARM__RADIUS_M=50`.
pub const ENV_PREFIX: &str = "GEOALARM_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Config {
    /// Alarm data file. Defaults to `alarms.json` in the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,

    /// Presentation defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Proximity and scheduling tuning.
    #[serde(default)]
    pub alarm: AlarmSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlarmSettings {
    /// Metres within which an alarm may be edited, disabled or stopped.
    #[serde(default = "default_radius")]
    pub radius_m: f64,

    /// Seconds between repeated notifications while ringing.
    #[serde(default = "default_repeat_interval")]
    pub repeat_interval_secs: u64,

    /// How long one pre-registered batch keeps ringing.
    #[serde(default = "default_max_repeat")]
    pub max_repeat_minutes: u64,

    /// Platform limit on pending notifications per batch.
    #[serde(default = "default_ceiling")]
    pub pending_ceiling: usize,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            radius_m: default_radius(),
            repeat_interval_secs: default_repeat_interval(),
            max_repeat_minutes: default_max_repeat(),
            pending_ceiling: default_ceiling(),
        }
    }
}

fn default_radius() -> f64 {
    100.0
}
fn default_repeat_interval() -> u64 {
    5
}
fn default_max_repeat() -> u64 {
    30
}
fn default_ceiling() -> usize {
    64
}

impl Config {
    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.alarm;
        if !a.radius_m.is_finite() || a.radius_m <= 0.0 {
            return Err(ConfigError::Validation {
                field: "alarm.radius_m".into(),
                reason: format!("must be a positive number of metres, got {}", a.radius_m),
            });
        }
        if a.repeat_interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "alarm.repeat_interval_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        if a.max_repeat_minutes == 0 {
            return Err(ConfigError::Validation {
                field: "alarm.max_repeat_minutes".into(),
                reason: "must be at least 1".into(),
            });
        }
        if a.pending_ceiling == 0 {
            return Err(ConfigError::Validation {
                field: "alarm.pending_ceiling".into(),
                reason: "must be at least 1".into(),
            });
        }
        match self.defaults.output.as_str() {
            "table" | "json" | "json-compact" | "yaml" | "plain" => Ok(()),
            other => Err(ConfigError::Validation {
                field: "defaults.output".into(),
                reason: format!(
                    "expected 'table', 'json', 'json-compact', 'yaml' or 'plain', got '{other}'"
                ),
            }),
        }
    }

    /// Build a validated `ControllerConfig`.
    pub fn to_controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        self.validate()?;
        Ok(ControllerConfig {
            radius_m: self.alarm.radius_m,
            repeat_interval: Duration::from_secs(self.alarm.repeat_interval_secs),
            max_repeat_duration: Duration::from_secs(self.alarm.max_repeat_minutes * 60),
            pending_ceiling: self.alarm.pending_ceiling,
            ..ControllerConfig::default()
        })
    }

    /// Configured data file, or the platform default.
    pub fn data_file_path(&self) -> PathBuf {
        self.data_file.clone().unwrap_or_else(default_data_file)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "geoalarm", "geoalarm")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform default location of the alarm list.
pub fn default_data_file() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share").join("alarms.json"),
        |dirs| dirs.data_dir().join("alarms.json"),
    )
}

fn dirs_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("geoalarm");
    p
}

// ── Config loading ──────────────────────────────────────────────────

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file is not an
/// error: defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_match_controller_defaults() {
        let cfg = Config::default().to_controller_config().unwrap();
        assert_eq!(cfg, ControllerConfig::default());
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                data_file = "/tmp/alarms.json"

                [alarm]
                radius_m = 250.0
                pending_ceiling = 32
                "#,
            )?;
            jail.set_env("GEOALARM_ALARM__RADIUS_M", "75");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert!((cfg.alarm.radius_m - 75.0).abs() < f64::EPSILON);
            assert_eq!(cfg.alarm.pending_ceiling, 32);
            assert_eq!(cfg.alarm.repeat_interval_secs, 5);
            assert_eq!(cfg.data_file_path(), PathBuf::from("/tmp/alarms.json"));
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let cfg = load_config_from(Path::new("nope.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg, Config::default());
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[alarm]\nradius_m = 0.0\n")?;
            let err = load_config_from(Path::new("config.toml")).unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation { ref field, .. } if field == "alarm.radius_m")
            );
            Ok(())
        });
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        let cfg = Config {
            defaults: Defaults {
                output: "xml".into(),
            },
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested/config.toml");
            let cfg = Config {
                alarm: AlarmSettings {
                    radius_m: 42.0,
                    ..AlarmSettings::default()
                },
                ..Config::default()
            };
            save_config_to(&cfg, &path).map_err(|e| e.to_string())?;
            let loaded = load_config_from(&path).map_err(|e| e.to_string())?;
            assert_eq!(loaded, cfg);
            Ok(())
        });
    }

    #[test]
    fn controller_config_converts_units() {
        let cfg = Config {
            alarm: AlarmSettings {
                repeat_interval_secs: 10,
                max_repeat_minutes: 5,
                ..AlarmSettings::default()
            },
            ..Config::default()
        };
        let cc = cfg.to_controller_config().unwrap();
        assert_eq!(cc.repeat_interval, Duration::from_secs(10));
        assert_eq!(cc.max_repeat_duration, Duration::from_secs(300));
        assert_eq!(cc.batch_size(), 30);
    }
}
