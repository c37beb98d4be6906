use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::MeetError;
use crate::router::MeetingId;
use crate::rtc::ClientConfig;

pub const DEFAULT_CHANNEL_NAME: &str = "main";

pub const ENV_APP_ID: &str = "MEET_APP_ID";
pub const ENV_CHANNEL_NAME: &str = "MEET_CHANNEL_NAME";
pub const ENV_TOKEN: &str = "MEET_TOKEN";

/// How screen share reaches the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenShareMode {
    /// A second client joins the channel and publishes only the screen.
    #[default]
    DedicatedClient,
    /// The media client swaps its camera track for the screen track.
    SharedClient,
}

/// Provider credentials and call preferences.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MeetingConfig {
    #[serde(default)]
    pub app_id: String,
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Use the meeting id from the URL as the channel name.
    #[serde(default)]
    pub channel_per_meeting: bool,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub screen_share: ScreenShareMode,
    #[serde(default = "default_true")]
    pub screen_system_audio: bool,
    #[serde(default = "default_true")]
    pub camera_on_join: bool,
    #[serde(default = "default_true")]
    pub mic_on_join: bool,
    #[serde(default)]
    pub join_timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            channel_name: default_channel_name(),
            token: None,
            channel_per_meeting: false,
            client: ClientConfig::default(),
            screen_share: ScreenShareMode::default(),
            screen_system_audio: true,
            camera_on_join: true,
            mic_on_join: true,
            join_timeout_ms: None,
        }
    }
}

impl MeetingConfig {
    /// Load from a JSON file. A missing file yields defaults; an unreadable
    /// one yields defaults and a warning.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring invalid config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), MeetError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MeetError::Config(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| MeetError::Config(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| MeetError::Config(e.to_string()))
    }

    /// Apply `MEET_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(app_id) = lookup(ENV_APP_ID) {
            self.app_id = app_id;
        }
        if let Some(channel) = lookup(ENV_CHANNEL_NAME) {
            self.channel_name = channel;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.token = if token.is_empty() { None } else { Some(token) };
        }
        self
    }

    pub fn validate(&self) -> Result<(), MeetError> {
        if self.app_id.trim().is_empty() {
            return Err(MeetError::Config("app id is not set".into()));
        }
        if !self.channel_per_meeting && self.channel_name.trim().is_empty() {
            return Err(MeetError::Config("channel name is not set".into()));
        }
        Ok(())
    }

    pub fn channel_for(&self, meeting: &MeetingId) -> String {
        if self.channel_per_meeting {
            meeting.as_str().to_string()
        } else {
            self.channel_name.clone()
        }
    }

    pub fn join_timeout(&self) -> Option<Duration> {
        self.join_timeout_ms.map(Duration::from_millis)
    }
}
