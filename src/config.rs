use crate::core::sync::SyncSettings;
use crate::game::gameplay::EngineSettings;
use crate::game::overdrive::OverdriveStyle;
use crate::game::timing_windows::{HitWindow, TimingProfile, ViewWindow};
use ini::Ini;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const CONFIG_PATH: &str = "fretsync.ini";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
    #[error("failed to write config '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    // [Gameplay]
    pub song_speed: f64,
    pub hopo_frequency_ticks: u64,
    pub min_sustain_ticks: u64,
    pub sustain_end_leniency_ms: f64,
    pub overdrive_style: OverdriveStyle,
    /// Fixed-point amount granted per overdrive note hit.
    pub overdrive_note_grant: i64,
    // [Timing], milliseconds except the start delay.
    pub hit_window_front_ms: f64,
    pub hit_window_back_ms: f64,
    pub view_ahead_ms: f64,
    pub view_behind_ms: f64,
    pub song_start_delay_seconds: f64,
    // [Sync]
    pub sync_initial_threshold_ms: f64,
    pub sync_adjust_threshold_ms: f64,
    pub sync_speed_step: f64,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            log_level: LogLevel::Warn,
            song_speed: engine.song_speed,
            hopo_frequency_ticks: engine.hopo_frequency_ticks,
            min_sustain_ticks: engine.min_sustain_ticks,
            sustain_end_leniency_ms: engine.sustain_end_leniency_s * 1000.0,
            overdrive_style: engine.overdrive_style,
            overdrive_note_grant: engine.overdrive_note_grant,
            hit_window_front_ms: engine.timing.hit.front_s * 1000.0,
            hit_window_back_ms: engine.timing.hit.back_s * 1000.0,
            view_ahead_ms: engine.timing.view.ahead_s * 1000.0,
            view_behind_ms: engine.timing.view.behind_s * 1000.0,
            song_start_delay_seconds: engine.song_start_delay_s,
            sync_initial_threshold_ms: engine.sync.initial_threshold_s * 1000.0,
            sync_adjust_threshold_ms: engine.sync.adjust_threshold_s * 1000.0,
            sync_speed_step: engine.sync.speed_step,
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Debug>(conf: &Ini, section: &str, key: &str, default: T) -> T {
    match conf.get_from(Some(section), key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("Invalid value '{raw}' for [{section}] {key}; using {default:?}.");
                default
            }
        },
    }
}

/// Positive finite values only.
fn positive_or(conf: &Ini, section: &str, key: &str, default: f64) -> f64 {
    let v = parse_or(conf, section, key, default);
    if v.is_finite() && v > 0.0 {
        v
    } else {
        warn!("[{section}] {key} must be positive, got {v}; using {default}.");
        default
    }
}

fn enum_or<T: FromStr + Copy + std::fmt::Debug>(conf: &Ini, section: &str, key: &str, default: T) -> T {
    conf.get_from(Some(section), key)
        .map(|raw| {
            T::from_str(raw).unwrap_or_else(|_| {
                warn!("Unknown value '{raw}' for [{section}] {key}; using {default:?}.");
                default
            })
        })
        .unwrap_or(default)
}

impl Config {
    /// Reads from an already parsed INI; missing keys keep their defaults.
    pub fn from_ini(conf: &Ini) -> Self {
        let default = Self::default();
        Self {
            log_level: enum_or(conf, "Options", "LogLevel", default.log_level),
            song_speed: positive_or(conf, "Gameplay", "SongSpeed", default.song_speed),
            hopo_frequency_ticks: parse_or(conf, "Gameplay", "HopoFrequencyTicks", default.hopo_frequency_ticks),
            min_sustain_ticks: parse_or(conf, "Gameplay", "MinSustainTicks", default.min_sustain_ticks),
            sustain_end_leniency_ms: parse_or(conf, "Gameplay", "SustainEndLeniencyMs", default.sustain_end_leniency_ms)
                .max(0.0),
            overdrive_style: enum_or(conf, "Gameplay", "OverdriveStyle", default.overdrive_style),
            overdrive_note_grant: parse_or(conf, "Gameplay", "OverdriveNoteGrant", default.overdrive_note_grant).max(0),
            hit_window_front_ms: positive_or(conf, "Timing", "HitWindowFrontMs", default.hit_window_front_ms),
            hit_window_back_ms: positive_or(conf, "Timing", "HitWindowBackMs", default.hit_window_back_ms),
            view_ahead_ms: positive_or(conf, "Timing", "ViewAheadMs", default.view_ahead_ms),
            view_behind_ms: positive_or(conf, "Timing", "ViewBehindMs", default.view_behind_ms),
            song_start_delay_seconds: parse_or(conf, "Timing", "SongStartDelaySeconds", default.song_start_delay_seconds)
                .max(0.0),
            sync_initial_threshold_ms: positive_or(
                conf,
                "Sync",
                "InitialThresholdMs",
                default.sync_initial_threshold_ms,
            ),
            sync_adjust_threshold_ms: positive_or(conf, "Sync", "AdjustThresholdMs", default.sync_adjust_threshold_ms),
            sync_speed_step: positive_or(conf, "Sync", "SpeedStep", default.sync_speed_step),
        }
    }

    pub fn to_ini(&self) -> Ini {
        let mut conf = Ini::new();
        conf.with_section(Some("Options")).set("LogLevel", self.log_level.as_str());
        conf.with_section(Some("Gameplay"))
            .set("HopoFrequencyTicks", self.hopo_frequency_ticks.to_string())
            .set("MinSustainTicks", self.min_sustain_ticks.to_string())
            .set("OverdriveNoteGrant", self.overdrive_note_grant.to_string())
            .set("OverdriveStyle", self.overdrive_style.as_str())
            .set("SongSpeed", self.song_speed.to_string())
            .set("SustainEndLeniencyMs", self.sustain_end_leniency_ms.to_string());
        conf.with_section(Some("Timing"))
            .set("HitWindowBackMs", self.hit_window_back_ms.to_string())
            .set("HitWindowFrontMs", self.hit_window_front_ms.to_string())
            .set("SongStartDelaySeconds", self.song_start_delay_seconds.to_string())
            .set("ViewAheadMs", self.view_ahead_ms.to_string())
            .set("ViewBehindMs", self.view_behind_ms.to_string());
        conf.with_section(Some("Sync"))
            .set("AdjustThresholdMs", self.sync_adjust_threshold_ms.to_string())
            .set("InitialThresholdMs", self.sync_initial_threshold_ms.to_string())
            .set("SpeedStep", self.sync_speed_step.to_string());
        conf
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.to_ini()
            .write_to_file(path)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }

    /// Loads `path`, writing a default file first when it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("'{}' not found, creating with default values.", path.display());
            let default = Self::default();
            if let Err(e) = default.save(path) {
                warn!("Failed to create default config file: {e}");
                return Ok(default);
            }
        }
        let conf =
            Ini::load_from_file(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config = Self::from_ini(&conf);
        info!("Loaded config from '{}' (log level {}).", path.display(), config.log_level.as_str());
        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let timing = TimingProfile {
            hit: HitWindow { front_s: self.hit_window_front_ms / 1000.0, back_s: self.hit_window_back_ms / 1000.0 },
            view: ViewWindow { ahead_s: self.view_ahead_ms / 1000.0, behind_s: self.view_behind_ms / 1000.0 },
        };
        EngineSettings {
            song_speed: self.song_speed,
            hopo_frequency_ticks: self.hopo_frequency_ticks,
            min_sustain_ticks: self.min_sustain_ticks,
            sustain_end_leniency_s: self.sustain_end_leniency_ms / 1000.0,
            timing: timing.normalized(),
            overdrive_style: self.overdrive_style,
            overdrive_note_grant: self.overdrive_note_grant,
            song_start_delay_s: self.song_start_delay_seconds,
            sync: SyncSettings {
                initial_threshold_s: self.sync_initial_threshold_ms / 1000.0,
                adjust_threshold_s: self.sync_adjust_threshold_ms / 1000.0,
                speed_step: self.sync_speed_step,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let conf = Ini::load_from_str("[Gameplay]\nHopoFrequencyTicks=240\n").unwrap();
        let config = Config::from_ini(&conf);
        assert_eq!(config.hopo_frequency_ticks, 240);
        assert_eq!(Config { hopo_frequency_ticks: 170, ..config }, Config::default());
    }

    #[test]
    fn malformed_values_are_ignored() {
        let conf = Ini::load_from_str(
            "[Options]\nLogLevel=loud\n[Gameplay]\nSongSpeed=-2\nOverdriveStyle=gh\n[Timing]\nHitWindowFrontMs=abc\n",
        )
        .unwrap();
        let config = Config::from_ini(&conf);
        let default = Config::default();
        assert_eq!(config.log_level, default.log_level);
        assert_eq!(config.song_speed, default.song_speed, "negative speed rejected");
        assert_eq!(config.hit_window_front_ms, default.hit_window_front_ms);
        assert_eq!(config.overdrive_style, OverdriveStyle::GuitarHero);
    }

    #[test]
    fn ini_round_trips_every_key() {
        let config = Config {
            log_level: LogLevel::Debug,
            song_speed: 1.25,
            overdrive_style: OverdriveStyle::GuitarHero,
            view_ahead_ms: 1_500.0,
            sync_speed_step: 0.1,
            ..Config::default()
        };
        assert_eq!(Config::from_ini(&config.to_ini()), config);
    }

    #[test]
    fn engine_settings_convert_units() {
        let config = Config { hit_window_front_ms: 50.0, sustain_end_leniency_ms: 80.0, ..Config::default() };
        let settings = config.engine_settings();
        assert!((settings.timing.hit.front_s - 0.05).abs() < 1e-12);
        assert!((settings.sustain_end_leniency_s - 0.08).abs() < 1e-12);
        assert_eq!(settings.hopo_frequency_ticks, config.hopo_frequency_ticks);
    }

    #[test]
    fn load_creates_a_default_file() {
        let dir = std::env::temp_dir().join(format!("fretsync-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_PATH);
        let _ = std::fs::remove_file(&path);
        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
