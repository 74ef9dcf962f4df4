//! cpuclock configuration (htoprc-style key=value format)
//!
//! The library only ever uses the values it is handed. The command-line host
//! loads them from `%APPDATA%/cpuclock/cpuclockrc` on Windows and
//! `$XDG_CONFIG_HOME/cpuclock/cpuclockrc` (or `~/.config/...`) elsewhere.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Base frequency used when nothing better is known (GHz).
pub const DEFAULT_BASE_GHZ: f64 = 2.0;

/// `max = base * DEFAULT_MAX_FACTOR` when no ceiling is reported.
pub const DEFAULT_MAX_FACTOR: f64 = 1.3;

/// Get the config file path for this platform.
pub fn config_path() -> Option<PathBuf> {
    let dir = if cfg!(windows) {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
    };
    dir.map(|d| d.join("cpuclock").join("cpuclockrc"))
}

/// Tunables for [`Monitor`](crate::Monitor) and the command-line host.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Base frequency used when every probe fails (GHz).
    pub default_base_ghz: f64,
    /// `max = base * factor` when no probe reports a ceiling.
    pub max_fallback_factor: f64,
    /// Gap between the two performance-counter collections.
    pub counter_sample_delay: Duration,
    /// How long a cached current reading may stand in for a failed probe.
    /// `None` keeps it forever. Written as `never` in the rc file.
    pub sticky_max_age: Option<Duration>,
    /// Refresh interval of `cpuclock --watch`.
    pub update_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_base_ghz: DEFAULT_BASE_GHZ,
            max_fallback_factor: DEFAULT_MAX_FACTOR,
            counter_sample_delay: Duration::from_millis(100),
            sticky_max_age: Some(Duration::from_secs(10)),
            update_interval_ms: 1500,
        }
    }
}

impl MonitorConfig {
    /// Load config from the default location, returning defaults if it doesn't exist
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => {
                log::debug!("loaded config from {}", path.display());
                Self::parse(&content)
            }
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines on top of the defaults. Unknown keys and
    /// unparsable values are ignored; numbers are clamped to sane ranges.
    pub fn parse(content: &str) -> Self {
        let mut cfg = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "default_base_ghz" => {
                    if let Ok(v) = value.parse::<f64>() {
                        if v.is_finite() {
                            cfg.default_base_ghz = v.clamp(0.2, 10.0);
                        }
                    }
                }
                "max_fallback_factor" => {
                    if let Ok(v) = value.parse::<f64>() {
                        if v.is_finite() {
                            cfg.max_fallback_factor = v.clamp(1.0, 3.0);
                        }
                    }
                }
                "counter_sample_ms" => {
                    if let Ok(v) = value.parse::<u64>() {
                        cfg.counter_sample_delay = Duration::from_millis(v.clamp(10, 2000));
                    }
                }
                "sticky_max_age_ms" => {
                    if value.eq_ignore_ascii_case("never") {
                        cfg.sticky_max_age = None;
                    } else if let Ok(v) = value.parse::<u64>() {
                        cfg.sticky_max_age = Some(Duration::from_millis(v));
                    }
                }
                "update_interval_ms" => {
                    if let Ok(v) = value.parse::<u64>() {
                        cfg.update_interval_ms = v.clamp(200, 10000);
                    }
                }
                _ => {} // Ignore unknown keys
            }
        }

        cfg
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        lines.push("# cpuclock configuration file".to_string());
        lines.push(String::new());
        lines.push(format!("default_base_ghz={}", self.default_base_ghz));
        lines.push(format!("max_fallback_factor={}", self.max_fallback_factor));
        lines.push(format!("counter_sample_ms={}", self.counter_sample_delay.as_millis()));
        lines.push(format!(
            "sticky_max_age_ms={}",
            self.sticky_max_age
                .map(|d| d.as_millis().to_string())
                .unwrap_or_else(|| "never".to_string())
        ));
        lines.push(format!("update_interval_ms={}", self.update_interval_ms));
        lines.join("\n") + "\n"
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path().context("could not determine config path")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }

        let mut file = fs::File::create(path)
            .with_context(|| format!("failed to create config file {}", path.display()))?;
        file.write_all(self.render().as_bytes())
            .with_context(|| format!("failed to write config file {}", path.display()))?;

        Ok(())
    }
}
