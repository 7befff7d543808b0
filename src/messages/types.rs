use crate::audio::AudioClip;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TurnId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMeta {
    pub tool_name: String,
    pub status: ToolStatus,
}

/// One message in the conversation log.
///
/// Turns are immutable once appended. The only exception is a tool-status turn,
/// which moves from `Pending` to `Success` or `Error` exactly once through
/// [`Turn::resolve_tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub audio: Option<AudioClip>,
    pub tool: Option<ToolMeta>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            audio: None,
            tool: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A pending `system` turn describing an in-flight tool call
    pub fn tool_call(tool_name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut turn = Self::new(Role::System, description);
        turn.tool = Some(ToolMeta {
            tool_name: tool_name.into(),
            status: ToolStatus::Pending,
        });
        turn
    }

    pub fn with_audio(mut self, clip: AudioClip) -> Self {
        self.audio = Some(clip);
        self
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn tool_status(&self) -> Option<ToolStatus> {
        self.tool.as_ref().map(|t| t.status)
    }

    /// Check if this is a pending tool turn for `tool_name`
    pub fn is_pending_tool(&self, tool_name: &str) -> bool {
        matches!(
            &self.tool,
            Some(ToolMeta { tool_name: name, status: ToolStatus::Pending }) if name == tool_name
        )
    }

    /// Transition a pending tool turn to its final status, replacing the content.
    ///
    /// Returns `false` (and changes nothing) for non-tool turns, turns that were
    /// already resolved, or a `Pending` target status.
    pub fn resolve_tool(&mut self, status: ToolStatus, content: impl Into<String>) -> bool {
        if status == ToolStatus::Pending {
            return false;
        }
        match &mut self.tool {
            Some(meta) if meta.status == ToolStatus::Pending => {
                meta.status = status;
                self.content = content.into();
                true
            }
            _ => false,
        }
    }
}
