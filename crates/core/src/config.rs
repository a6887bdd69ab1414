//! Driver configuration.
//!
//! Loaded from JSON; every field has a default so an empty object is a
//! valid configuration.

use crate::error::{Error, Result};
use crate::profile::DeviceProfile;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default frame queue depth.
pub const DEFAULT_QUEUE_LEN: usize = 50;
/// Highest accepted polling rate.
pub const MAX_POLL_RATE_HZ: u32 = 1000;

/// Whether the separate button channel is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonChannel {
    /// Only for variants without an integrated button.
    #[default]
    Auto,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Frame queue capacity in frames.
    pub queue_len: usize,
    /// Interrupt polling rate override, applied once on the next start.
    pub poll_rate_hz: Option<u32>,
    pub button_channel: ButtonChannel,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            queue_len: DEFAULT_QUEUE_LEN,
            poll_rate_hz: None,
            button_channel: ButtonChannel::Auto,
        }
    }
}

impl DriverConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_len == 0 {
            return Err(Error::Config("queue_len must be > 0".into()));
        }
        Ok(())
    }

    /// Polling interval in ms for the configured rate, clamped to 1000 Hz.
    ///
    /// `None` when no override is set (or the rate is 0).
    pub fn poll_interval_ms(&self) -> Option<u32> {
        match self.poll_rate_hz {
            Some(rate) if rate > 0 => Some(1000 / rate.min(MAX_POLL_RATE_HZ)),
            _ => None,
        }
    }

    /// Whether the button channel runs for `profile`.
    pub fn button_channel_enabled(&self, profile: &DeviceProfile) -> bool {
        match self.button_channel {
            ButtonChannel::Auto => !profile.has_integrated_button(),
            ButtonChannel::Enabled => true,
            ButtonChannel::Disabled => false,
        }
    }
}
