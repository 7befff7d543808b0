//! Configuration for the voice turn controller
//!
//! Provides centralized configuration for all components. Everything has a
//! default, so a TOML file only needs the keys it changes.

use crate::audio::capture::{CaptureConstraints, DeviceSelector};
use crate::{Result, VoiceTurnError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Voice persona used for speech synthesis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoicePersona {
    Alloy,
    Echo,
    Fable,
    Onyx,
    #[default]
    Nova,
    Shimmer,
}

impl VoicePersona {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoicePersona::Alloy => "alloy",
            VoicePersona::Echo => "echo",
            VoicePersona::Fable => "fable",
            VoicePersona::Onyx => "onyx",
            VoicePersona::Nova => "nova",
            VoicePersona::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for VoicePersona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoicePersona {
    type Err = VoiceTurnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "alloy" => Ok(VoicePersona::Alloy),
            "echo" => Ok(VoicePersona::Echo),
            "fable" => Ok(VoicePersona::Fable),
            "onyx" => Ok(VoicePersona::Onyx),
            "nova" => Ok(VoicePersona::Nova),
            "shimmer" => Ok(VoicePersona::Shimmer),
            other => Err(VoiceTurnError::ConfigError(format!("Unknown voice: {}", other))),
        }
    }
}

/// Remote backend endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL without trailing slash
    pub base_url: String,
    pub transcribe_path: String,
    pub chat_path: String,
    pub speech_path: String,
    pub token_path: String,
    pub analyze_image_path: String,
    /// Per-request timeout; also the only bound on a hung pipeline stage
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            transcribe_path: "/api/transcribe".to_string(),
            chat_path: "/api/chat".to_string(),
            speech_path: "/api/text-to-speech".to_string(),
            token_path: "/api/livekit/token".to_string(),
            analyze_image_path: "/api/analyze-image".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl BackendConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Capture session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Recordings shorter than this are discarded
    pub min_duration_ms: u64,
    /// Interval at which the device hands over buffered chunks
    pub timeslice_ms: u64,
    pub constraints: CaptureConstraints,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 500,
            timeslice_ms: 100,
            constraints: CaptureConstraints::default(),
        }
    }
}

impl CaptureConfig {
    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }
}

/// Streaming (real-time transport) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Transport server, used when the token grant carries no URL
    pub server_url: String,
    pub room_prefix: String,
    pub participant_name: String,
    /// Logical event channel carrying transcription and tool events
    pub channel: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:7880".to_string(),
            room_prefix: "movi-voice".to_string(),
            participant_name: "user".to_string(),
            channel: "agent.thoughts".to_string(),
        }
    }
}

/// Configuration for the complete controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub backend: BackendConfig,
    pub capture: CaptureConfig,
    pub live: LiveConfig,

    /// Voice persona for synthesized replies
    pub voice: VoicePersona,

    /// Microphone to open on press
    pub input_device: DeviceSelector,

    /// Opaque page identifier passed through to reasoning calls
    pub page_context: String,

    /// Whether to enable audio input
    pub enable_audio_input: bool,

    /// Whether to enable audio output
    pub enable_audio_output: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            capture: CaptureConfig::default(),
            live: LiveConfig::default(),
            voice: VoicePersona::default(),
            input_device: DeviceSelector::default(),
            page_context: "busDashboard".to_string(),
            enable_audio_input: true,
            enable_audio_output: true,
        }
    }
}

impl ControllerConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| VoiceTurnError::ConfigError(format!("Invalid config: {}", e)))
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VoiceTurnError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend.base_url = url.into();
        self
    }

    pub fn with_voice(mut self, voice: VoicePersona) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_input_device(mut self, device: DeviceSelector) -> Self {
        self.input_device = device;
        self
    }

    pub fn with_page_context(mut self, page: impl Into<String>) -> Self {
        self.page_context = page.into();
        self
    }

    /// Disable audio input (text and image only)
    pub fn without_audio_input(mut self) -> Self {
        self.enable_audio_input = false;
        self
    }

    /// Disable audio output (replies are shown as text only)
    pub fn without_audio_output(mut self) -> Self {
        self.enable_audio_output = false;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = &self.backend.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(VoiceTurnError::ConfigError(format!(
                "Backend URL must be http(s): {:?}",
                url
            )));
        }

        if self.backend.request_timeout_secs == 0 {
            return Err(VoiceTurnError::ConfigError(
                "Request timeout must be positive".to_string(),
            ));
        }

        if self.capture.timeslice_ms == 0 {
            return Err(VoiceTurnError::ConfigError(
                "Capture timeslice must be positive".to_string(),
            ));
        }

        if self.capture.constraints.channel_count == 0 {
            return Err(VoiceTurnError::ConfigError(
                "Capture channel count must be positive".to_string(),
            ));
        }

        let server = &self.live.server_url;
        if !(server.starts_with("ws://") || server.starts_with("wss://")) {
            return Err(VoiceTurnError::ConfigError(format!(
                "Live server URL must be ws(s): {:?}",
                server
            )));
        }

        if self.live.channel.is_empty() {
            return Err(VoiceTurnError::ConfigError(
                "Live channel name is required".to_string(),
            ));
        }

        Ok(())
    }
}
