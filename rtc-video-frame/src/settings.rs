//! Pipeline settings
//!
//! Handles loading/saving of the pipeline XML file: GPU adapter selection,
//! capture→render queue depth and logging.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::frame::{frame_handoff, FrameReceiver, FrameSender};

/// GPU adapter power preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PowerPreference {
    /// Let the platform decide
    None,
    LowPower,
    #[default]
    HighPerformance,
}

impl PowerPreference {
    pub fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            PowerPreference::None => wgpu::PowerPreference::None,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Settings stored in the pipeline XML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "PipelineSettings")]
pub struct PipelineSettings {
    /// Adapter power preference
    #[serde(rename = "powerPreference", default)]
    pub power_preference: PowerPreference,

    /// Only accept a software (fallback) adapter
    #[serde(rename = "forceFallbackAdapter", default)]
    pub force_fallback_adapter: bool,

    /// Frames the capture→render queue holds before dropping (1-16)
    #[serde(rename = "handoffCapacity", default = "default_handoff_capacity")]
    pub handoff_capacity: usize,

    /// Default log filter when neither RTC_FRAME_LOG nor RUST_LOG is set
    #[serde(rename = "logLevel", default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(rename = "logJson", default)]
    pub log_json: bool,

    /// Also write logs to this file
    #[serde(rename = "logFile", default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

fn default_handoff_capacity() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::default(),
            force_fallback_adapter: false,
            handoff_capacity: default_handoff_capacity(),
            log_level: default_log_level(),
            log_json: false,
            log_file: None,
        }
    }
}

impl PipelineSettings {
    /// Default settings file in the user config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("rtc-video-frame");
            p.push("pipeline.xml");
            p
        })
    }

    /// Parse settings from XML, clamping out-of-range values
    pub fn from_xml(xml: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = from_str(xml).map_err(SettingsError::XmlParse)?;
        settings.clamp();
        Ok(settings)
    }

    pub fn to_xml(&self) -> Result<String, SettingsError> {
        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml))
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        Self::from_xml(&contents)
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring invalid settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }
        fs::write(path, self.to_xml()?).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Capture→render handoff sized by `handoff_capacity`
    pub fn frame_handoff(&self) -> (FrameSender, FrameReceiver) {
        frame_handoff(self.handoff_capacity.clamp(1, 16))
    }

    /// Clamp the handoff capacity to 1-16
    pub fn clamp(&mut self) {
        self.handoff_capacity = self.handoff_capacity.clamp(1, 16);
    }
}

/// Settings-related errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[source] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[source] quick_xml::SeError),
}
