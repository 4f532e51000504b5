//! Typed panel configuration
//!
//! Handles:
//! - Credentials for the HTTP Basic gate
//! - Confined root, sensors and refresh settings
//! - TOML persistence in an OS-specific location
//! - Partial updates from the settings form

use crate::metrics::MonitorSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Refresh intervals below this are refused
pub const MIN_MONITOR_REFRESH: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub login: String,
    pub password: String,
    pub port: u16,
    /// The only directory tree the file manager may touch
    pub root_dir: PathBuf,
    /// Seconds between monitoring polls on the client
    pub monitor_refresh: f64,
    /// Preferred auxiliary sensor name, empty for "first available"
    pub ssd_sensor: String,
    pub show_nvme: bool,
    pub nvme_command: Vec<String>,
    pub sensor_timeout_secs: u64,
    pub config_location: BootConfigLocation,
    pub service_name: String,
    /// Replace existing files on upload instead of refusing them
    pub upload_overwrite: bool,
}

/// Which firmware layout holds `config.txt`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BootConfigLocation {
    #[serde(rename = "32")]
    Legacy32,
    #[default]
    #[serde(rename = "64")]
    Firmware64,
}

/// Settings form payload; absent or blank fields leave the value unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub login: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub monitor_refresh: Option<f64>,
    pub ssd_sensor: Option<String>,
    pub show_nvme: Option<bool>,
    pub config_location: Option<BootConfigLocation>,
    pub upload_overwrite: Option<bool>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            login: "admin".to_string(),
            password: "admin".to_string(),
            port: 5000,
            root_dir: PathBuf::from("/home/pi/RetroPie"),
            monitor_refresh: MIN_MONITOR_REFRESH,
            ssd_sensor: String::new(),
            show_nvme: false,
            nvme_command: ["sudo", "nvme", "smart-log", "/dev/nvme0"]
                .map(String::from)
                .to_vec(),
            sensor_timeout_secs: 2,
            config_location: BootConfigLocation::Firmware64,
            service_name: "web_panel.service".to_string(),
            upload_overwrite: false,
        }
    }
}

impl BootConfigLocation {
    pub fn path(self) -> &'static Path {
        match self {
            BootConfigLocation::Legacy32 => Path::new("/boot/config.txt"),
            BootConfigLocation::Firmware64 => Path::new("/boot/firmware/config.txt"),
        }
    }
}

impl PanelConfig {
    /// Load from `path`; the first run writes the defaults there
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: PanelConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        if config.monitor_refresh.is_nan() || config.monitor_refresh < MIN_MONITOR_REFRESH {
            warn!(
                "monitor_refresh {} below minimum, using {}",
                config.monitor_refresh, MIN_MONITOR_REFRESH
            );
            config.monitor_refresh = MIN_MONITOR_REFRESH;
        }
        Ok(config)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// `PANEL_CONFIG`, else the OS config directory
    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("PANEL_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("pi-panel");
        path.push("config.toml");
        Ok(path)
    }

    /// Apply a settings form; returns a short description of what changed
    pub fn apply(&mut self, update: SettingsUpdate) -> Vec<String> {
        let mut changes = Vec::new();

        let login = update.login.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let password = update.password.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if login.is_some() || password.is_some() {
            if let Some(login) = login {
                self.login = login;
            }
            if let Some(password) = password {
                self.password = password;
            }
            changes.push("Credentials updated.".to_string());
        }

        if let Some(port) = update.port.filter(|p| *p > 0) {
            self.port = port;
            changes.push(format!("Port set to {port}."));
        }
        match update.monitor_refresh {
            Some(refresh) if refresh >= MIN_MONITOR_REFRESH => {
                self.monitor_refresh = refresh;
                changes.push(format!("Monitor refresh set to {refresh}s."));
            }
            Some(refresh) => {
                changes.push(format!(
                    "Monitor refresh {refresh}s ignored (minimum {MIN_MONITOR_REFRESH}s)."
                ));
            }
            None => {}
        }
        if let Some(sensor) = update.ssd_sensor {
            self.ssd_sensor = sensor.trim().to_string();
            changes.push("Preferred sensor updated.".to_string());
        }
        if let Some(show) = update.show_nvme {
            self.show_nvme = show;
            changes.push(format!("NVMe sensors {}.", if show { "shown" } else { "hidden" }));
        }
        if let Some(location) = update.config_location {
            self.config_location = location;
            changes.push(format!("Boot config at {}.", location.path().display()));
        }
        if let Some(overwrite) = update.upload_overwrite {
            self.upload_overwrite = overwrite;
            changes.push("Upload policy updated.".to_string());
        }

        changes
    }

    /// Copy with the password blanked, for display
    pub fn redacted(&self) -> Self {
        Self {
            password: String::new(),
            ..self.clone()
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            disk_path: self.root_dir.clone(),
            show_aux_sensors: self.show_nvme,
            aux_sensor_command: self.nvme_command.clone(),
            command_timeout: Duration::from_secs(self.sensor_timeout_secs),
            ..MonitorSettings::default()
        }
    }

    /// Preferred sensor, `None` when not configured
    pub fn preferred_sensor(&self) -> Option<&str> {
        Some(self.ssd_sensor.as_str()).filter(|s| !s.is_empty())
    }
}
