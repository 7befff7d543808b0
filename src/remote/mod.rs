//! Remote processing services
//!
//! The backend is opaque: speech recognition, reasoning, speech synthesis,
//! token issuance for the live transport and image analysis are all single
//! request/response calls behind [`RemoteServices`].

pub mod http;

pub use http::HttpServices;

use crate::audio::{AudioBuffer, AudioClip};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reasoning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub thread_id: String,
    pub current_page: String,
}

/// Reasoning reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(rename = "response")]
    pub text: String,
    /// Server is waiting for the user to confirm a consequential action
    #[serde(default)]
    pub awaiting_confirmation: bool,
}

/// Speech synthesis request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub room_name: String,
    pub participant_name: String,
}

/// Access grant for the live transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    /// Server URL override; the configured one is used when absent
    #[serde(default)]
    pub url: Option<String>,
}

/// Image submitted for analysis
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let extension = match mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "jpg",
        };
        Self {
            bytes,
            mime_type,
            file_name: format!("image.{}", extension),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    /// What the backend understood the user wants
    pub interpreted_intent: String,
    pub response: String,
}

#[async_trait]
pub trait RemoteServices: Send + Sync {
    /// Speech to text. A blank transcript is an error.
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String>;

    async fn reason(&self, request: &ChatRequest) -> Result<ChatReply>;

    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioClip>;

    async fn acquire_token(&self, request: &TokenRequest) -> Result<TokenGrant>;

    async fn analyze_image(
        &self,
        image: &ImageUpload,
        thread_id: &str,
        current_page: &str,
    ) -> Result<ImageAnalysis>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_reply_field_names() {
        let reply: ChatReply =
            serde_json::from_str(r#"{"response":"Route 12 is active.","thread_id":"x"}"#).unwrap();
        assert_eq!(reply.text, "Route 12 is active.");
        assert!(!reply.awaiting_confirmation);

        let reply: ChatReply = serde_json::from_str(
            r#"{"response":"Remove the driver?","awaiting_confirmation":true}"#,
        )
        .unwrap();
        assert!(reply.awaiting_confirmation);
    }

    #[test]
    fn test_token_request_is_camel_case() {
        let json = serde_json::to_value(TokenRequest {
            room_name: "movi-voice-session_1".into(),
            participant_name: "user".into(),
        })
        .unwrap();
        assert_eq!(json["roomName"], "movi-voice-session_1");
        assert_eq!(json["participantName"], "user");
    }

    #[test]
    fn test_token_grant_without_url() {
        let grant: TokenGrant = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert_eq!(grant.token, "abc");
        assert!(grant.url.is_none());
    }

    #[test]
    fn test_image_upload_file_name() {
        assert_eq!(ImageUpload::new(vec![1], "image/png").file_name, "image.png");
        assert_eq!(ImageUpload::new(vec![1], "image/jpeg").file_name, "image.jpg");
    }
}
