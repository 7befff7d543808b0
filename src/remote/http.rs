use super::{
    ChatReply, ChatRequest, ImageAnalysis, ImageUpload, RemoteServices, SpeechRequest,
    TokenGrant, TokenRequest,
};
use crate::audio::{AudioBuffer, AudioClip};
use crate::config::BackendConfig;
use crate::{Result, VoiceTurnError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_SPEECH_MIME: &str = "audio/mpeg";

#[derive(Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    text: String,
}

/// Backend client speaking JSON and multipart over HTTP
#[derive(Debug, Clone)]
pub struct HttpServices {
    config: BackendConfig,
    client: Client,
}

impl HttpServices {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| VoiceTurnError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        info!("Using backend at {}", config.base_url);
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        self.config.url(path)
    }
}

/// Map a non-success status to `err`, including the body for diagnostics
async fn check_status(
    response: Response,
    err: impl FnOnce(String) -> VoiceTurnError,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(err(format!("HTTP {}: {}", status, body.trim())))
}

#[async_trait]
impl RemoteServices for HttpServices {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        let fail = VoiceTurnError::TranscriptionFailed;
        let part = Part::bytes(audio.bytes().to_vec())
            .file_name(audio.file_name())
            .mime_str(audio.mime_type())
            .map_err(|e| fail(e.to_string()))?;
        let form = Form::new().part("audio", part);

        debug!(
            "Uploading {} bytes of {} for transcription",
            audio.len(),
            audio.mime_type()
        );
        let response = self
            .client
            .post(self.url(&self.config.transcribe_path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let response = check_status(response, fail).await?;

        let body: TranscriptResponse = response.json().await.map_err(|e| fail(e.to_string()))?;
        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(fail("No speech recognized".to_string()));
        }
        Ok(text)
    }

    async fn reason(&self, request: &ChatRequest) -> Result<ChatReply> {
        let fail = VoiceTurnError::ReasoningFailed;
        let response = self
            .client
            .post(self.url(&self.config.chat_path))
            .json(request)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let response = check_status(response, fail).await?;

        response.json().await.map_err(|e| fail(e.to_string()))
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioClip> {
        let fail = VoiceTurnError::SynthesisFailed;
        let response = self
            .client
            .post(self.url(&self.config.speech_path))
            .json(request)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let response = check_status(response, fail).await?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or(DEFAULT_SPEECH_MIME)
            .to_string();
        let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        if bytes.is_empty() {
            return Err(fail("Empty audio response".to_string()));
        }

        debug!("Received {} bytes of {}", bytes.len(), mime_type);
        Ok(AudioClip::new(bytes.to_vec(), mime_type))
    }

    async fn acquire_token(&self, request: &TokenRequest) -> Result<TokenGrant> {
        let fail = VoiceTurnError::TransportConnectFailed;
        let response = self
            .client
            .post(self.url(&self.config.token_path))
            .json(request)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let response = check_status(response, fail).await?;

        response.json().await.map_err(|e| fail(e.to_string()))
    }

    async fn analyze_image(
        &self,
        image: &ImageUpload,
        thread_id: &str,
        current_page: &str,
    ) -> Result<ImageAnalysis> {
        let fail = VoiceTurnError::ReasoningFailed;
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| fail(e.to_string()))?;
        let form = Form::new()
            .part("image", part)
            .text("thread_id", thread_id.to_string())
            .text("current_page", current_page.to_string());

        let response = self
            .client
            .post(self.url(&self.config.analyze_image_path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let response = check_status(response, fail).await?;

        response.json().await.map_err(|e| fail(e.to_string()))
    }
}
