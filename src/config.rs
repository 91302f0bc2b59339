use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub from_addr: String,
    pub to_addr: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackSettings {
    pub token: String,
    pub channel: String,
}

/// Process-wide configuration, loaded once at startup and immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between polls of the camera.
    pub interval_secs: f64,
    /// Hamming distance above which two consecutive frames count as changed.
    pub hash_threshold: u32,
    /// Quiet polls an episode stays open after the last detected change.
    pub retention_ticks: u32,
    /// Trailing frames dropped from an episode before composing the report.
    #[serde(default)]
    pub tailcut_ticks: u32,
    #[serde(default)]
    pub camera_index: i32,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub email: EmailSettings,
    pub slack: SlackSettings,
}

fn default_frame_width() -> u32 {
    640
}

fn default_frame_height() -> u32 {
    480
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl WatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: WatchConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs <= 0.0 {
            bail!("interval_secs must be positive");
        }
        if self.retention_ticks == 0 {
            bail!("retention_ticks must be at least 1");
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            bail!("frame dimensions must be non-zero");
        }
        Ok(())
    }

    /// Logs the delivery endpoints at startup. Credentials stay out of the log.
    pub fn log_endpoints(&self) {
        info!(
            "mail: {} -> {} via {}:{} as {}",
            self.email.from_addr,
            self.email.to_addr,
            self.email.smtp_host,
            self.email.smtp_port,
            self.email.smtp_user
        );
        info!("slack channel: {}", self.slack.channel);
    }
}
