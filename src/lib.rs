pub mod audio;
pub mod config;
pub mod controller;
pub mod live;
pub mod messages;
pub mod pipeline;
pub mod remote;
pub mod session;

pub use config::ControllerConfig;
pub use controller::{ControllerEvent, ReleaseOutcome, VoiceController};
pub use messages::{ConversationLog, Role, SharedConversationLog, ToolStatus, Turn, TurnId};
pub use session::SessionId;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceTurnError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Recording too short: {duration_ms}ms (minimum {min_ms}ms)")]
    RecordingTooShort { duration_ms: u64, min_ms: u64 },

    #[error("Recording is empty")]
    EmptyRecording,

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Reasoning failed: {0}")]
    ReasoningFailed(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Transport connection failed: {0}")]
    TransportConnectFailed(String),

    #[error("A capture is already in progress")]
    CaptureBusy,

    #[error("A turn is already being processed")]
    PipelineBusy,

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for VoiceTurnError {
    fn from(e: std::io::Error) -> Self {
        VoiceTurnError::IOError(e.to_string())
    }
}

impl VoiceTurnError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The user has to grant access or plug in a device
            VoiceTurnError::PermissionDenied(_) => false,
            VoiceTurnError::DeviceUnavailable(_) => false,
            // Re-initiating the gesture is enough
            VoiceTurnError::RecordingTooShort { .. } => true,
            VoiceTurnError::EmptyRecording => true,
            VoiceTurnError::TranscriptionFailed(_) => true,
            VoiceTurnError::ReasoningFailed(_) => true,
            VoiceTurnError::SynthesisFailed(_) => true,
            VoiceTurnError::TransportConnectFailed(_) => true,
            VoiceTurnError::CaptureBusy => true,
            VoiceTurnError::PipelineBusy => true,
            VoiceTurnError::PlaybackError(_) => true,
            VoiceTurnError::ProtocolError(_) => true,
            VoiceTurnError::ConfigError(_) => false,
            VoiceTurnError::ChannelError(_) => false,
            VoiceTurnError::IOError(_) => false,
        }
    }

    /// Errors surfaced as an immediate blocking notice instead of a log entry,
    /// since no turn was ever attempted.
    pub fn is_blocking_notice(&self) -> bool {
        matches!(
            self,
            VoiceTurnError::PermissionDenied(_) | VoiceTurnError::DeviceUnavailable(_)
        )
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            VoiceTurnError::PermissionDenied(_) => {
                "Microphone access was denied. Please allow microphone access to use voice input."
                    .to_string()
            }
            VoiceTurnError::DeviceUnavailable(_) => {
                "No microphone was found. Please connect a microphone and try again.".to_string()
            }
            VoiceTurnError::RecordingTooShort { .. } => {
                "Sorry, that recording was too short. Please hold the button while you speak."
                    .to_string()
            }
            VoiceTurnError::EmptyRecording => {
                "Sorry, I didn't catch any audio. Please check your microphone and try again."
                    .to_string()
            }
            VoiceTurnError::TranscriptionFailed(_) => {
                "Sorry, I couldn't understand that. Please try again.".to_string()
            }
            VoiceTurnError::ReasoningFailed(_) => {
                "Sorry, I couldn't get a response right now. Please try again.".to_string()
            }
            VoiceTurnError::SynthesisFailed(_) => {
                "Sorry, I couldn't generate a spoken reply. Please try again.".to_string()
            }
            VoiceTurnError::TransportConnectFailed(_) => {
                "Sorry, I couldn't start the voice session. Please try again.".to_string()
            }
            VoiceTurnError::CaptureBusy => "Already listening.".to_string(),
            VoiceTurnError::PipelineBusy => {
                "Still working on your last request. Please wait a moment.".to_string()
            }
            VoiceTurnError::PlaybackError(_) => {
                "Sorry, I couldn't play the reply audio.".to_string()
            }
            VoiceTurnError::ProtocolError(_) => {
                "Sorry, something went wrong. Please try again.".to_string()
            }
            VoiceTurnError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            VoiceTurnError::ChannelError(_) => {
                "Internal communication error. Please restart the voice assistant.".to_string()
            }
            VoiceTurnError::IOError(_) => {
                "Sorry, I couldn't process that recording. Please try again.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, VoiceTurnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_notices() {
        assert!(VoiceTurnError::PermissionDenied("denied".into()).is_blocking_notice());
        assert!(VoiceTurnError::DeviceUnavailable("none".into()).is_blocking_notice());
        assert!(!VoiceTurnError::EmptyRecording.is_blocking_notice());
        assert!(!VoiceTurnError::TranscriptionFailed("500".into()).is_blocking_notice());
    }

    #[test]
    fn test_user_message_has_no_diagnostics() {
        let err = VoiceTurnError::ReasoningFailed("HTTP 502 from upstream".into());
        let message = err.user_message();
        assert!(message.starts_with("Sorry"));
        assert!(!message.contains("502"));
    }

    #[test]
    fn test_io_failure_reads_as_apology() {
        let err = VoiceTurnError::from(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "WAV header write failed",
        ));
        let message = err.user_message();
        assert!(message.starts_with("Sorry"));
        assert!(!message.contains("WAV"));
    }

    #[test]
    fn test_turn_errors_are_recoverable() {
        assert!(VoiceTurnError::RecordingTooShort { duration_ms: 120, min_ms: 500 }.is_recoverable());
        assert!(VoiceTurnError::SynthesisFailed("timeout".into()).is_recoverable());
        assert!(!VoiceTurnError::ConfigError("bad url".into()).is_recoverable());
    }
}
