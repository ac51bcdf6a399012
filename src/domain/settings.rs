use crate::domain::control::ControlSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default)]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: false,
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "rc_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Peripheral matching
    #[serde(default = "default_controller_prefix")]
    pub controller_name_prefix: String,
    #[serde(default = "default_hub_fragment")]
    pub hub_name_fragment: String,

    // Scan behavior
    #[serde(default = "default_scan_duration_ms")]
    pub scan_duration_ms: u64,
    /// Scan interval in transport-specific timing units.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u16,
    /// Scan window in transport-specific timing units.
    #[serde(default = "default_scan_window")]
    pub scan_window: u16,
    /// Pause between scan retries when a role was not found.
    #[serde(default = "default_cooldown_ms")]
    pub scan_cooldown_ms: u64,
    /// Optional ceiling on scan retries; `None` retries forever.
    #[serde(default)]
    pub scan_max_attempts: Option<u32>,

    // Connect behavior
    #[serde(default = "default_stabilize_ms")]
    pub connect_stabilize_ms: u64,
    #[serde(default = "default_connect_retries")]
    pub connect_max_retries: u32,
    #[serde(default = "default_cooldown_ms")]
    pub connect_retry_cooldown_ms: u64,

    // Recovery behavior
    #[serde(default = "default_cooldown_ms")]
    pub recovery_cooldown_ms: u64,

    // Periodic housekeeping
    #[serde(default = "default_control_period_ms")]
    pub control_period_ms: u64,
    #[serde(default = "default_status_period_ms")]
    pub status_period_ms: u64,
    #[serde(default = "default_display_period_ms")]
    pub display_period_ms: u64,

    #[serde(default)]
    pub control: ControlSettings,

    #[serde(default)]
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            controller_name_prefix: default_controller_prefix(),
            hub_name_fragment: default_hub_fragment(),
            scan_duration_ms: default_scan_duration_ms(),
            scan_interval: default_scan_interval(),
            scan_window: default_scan_window(),
            scan_cooldown_ms: default_cooldown_ms(),
            scan_max_attempts: None,
            connect_stabilize_ms: default_stabilize_ms(),
            connect_max_retries: default_connect_retries(),
            connect_retry_cooldown_ms: default_cooldown_ms(),
            recovery_cooldown_ms: default_cooldown_ms(),
            control_period_ms: default_control_period_ms(),
            status_period_ms: default_status_period_ms(),
            display_period_ms: default_display_period_ms(),
            control: ControlSettings::default(),
            log: LogSettings::default(),
        }
    }
}

fn default_controller_prefix() -> String {
    "Xbox".to_string()
}
fn default_hub_fragment() -> String {
    "Technic Move".to_string()
}
fn default_scan_duration_ms() -> u64 {
    10_000
}
fn default_scan_interval() -> u16 {
    0x80
}
fn default_scan_window() -> u16 {
    0x30
}
fn default_cooldown_ms() -> u64 {
    2000
}
fn default_stabilize_ms() -> u64 {
    1000
}
fn default_connect_retries() -> u32 {
    3
}
fn default_control_period_ms() -> u64 {
    50 // 20 Hz
}
fn default_status_period_ms() -> u64 {
    1000
}
fn default_display_period_ms() -> u64 {
    200
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("rc-bridge");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }
}
