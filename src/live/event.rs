//! Wire format of the live event channel

use crate::{Result, VoiceTurnError};
use serde::{Deserialize, Serialize};

/// Speaker name marking agent-authored transcriptions
pub const AGENT_SPEAKER: &str = "agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Transcription,
    ToolCall,
    ToolResult,
}

/// One message received on the event channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(default)]
    pub content: String,

    /// Tool name, or the speaker for transcriptions
    #[serde(rename = "toolName", default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Sender-side timestamp; informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TransportEvent {
    pub fn transcription(content: impl Into<String>, speaker: Option<&str>) -> Self {
        Self {
            kind: EventKind::Transcription,
            content: content.into(),
            tool_name: speaker.map(str::to_string),
            timestamp: None,
        }
    }

    pub fn tool_call(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::ToolCall,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            timestamp: None,
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::ToolResult,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            timestamp: None,
        }
    }

    /// Whether a transcription was spoken by the agent
    pub fn is_from_agent(&self) -> bool {
        self.tool_name.as_deref() == Some(AGENT_SPEAKER)
    }

    /// Decode one UTF-8 JSON payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| VoiceTurnError::ProtocolError(format!("Undecodable event: {}", e)))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| VoiceTurnError::ProtocolError(format!("Failed to encode event: {}", e)))
    }
}
