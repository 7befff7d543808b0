//! In-process doubles for the remote backend and audio devices

#![allow(dead_code)]

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use voiceturn::audio::{
    AudioBuffer, AudioClip, AudioOutput, CaptureConstraints, CaptureStream, DeviceSelector,
    InputDevice, StreamFormat,
};
use voiceturn::remote::{
    ChatReply, ChatRequest, ImageAnalysis, ImageUpload, RemoteServices, SpeechRequest,
    TokenGrant, TokenRequest,
};
use voiceturn::{Result, VoiceTurnError};

/// Which stage of the backend should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nothing,
    Transcribe,
    Reason,
    Synthesize,
    Token,
}

/// Scripted backend recording every request it receives
pub struct MockServices {
    pub transcript: String,
    pub reply: String,
    pub awaiting_confirmation: bool,
    pub token_url: Option<String>,
    fail_at: Mutex<FailAt>,
    /// When set, reasoning waits for one message on this channel
    gate: Option<Receiver<()>>,
    pub transcriptions: Mutex<Vec<AudioBuffer>>,
    pub chats: Mutex<Vec<ChatRequest>>,
    pub speeches: Mutex<Vec<SpeechRequest>>,
    pub tokens: Mutex<Vec<TokenRequest>>,
}

impl MockServices {
    pub fn new() -> Self {
        Self {
            transcript: "Show me all trips for today".to_string(),
            reply: "There are 4 trips scheduled today.".to_string(),
            awaiting_confirmation: false,
            token_url: None,
            fail_at: Mutex::new(FailAt::Nothing),
            gate: None,
            transcriptions: Mutex::new(Vec::new()),
            chats: Mutex::new(Vec::new()),
            speeches: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(self, stage: FailAt) -> Self {
        *self.fail_at.lock() = stage;
        self
    }

    pub fn with_transcript(mut self, text: &str) -> Self {
        self.transcript = text.to_string();
        self
    }

    pub fn with_gate(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_token_url(mut self, url: &str) -> Self {
        self.token_url = Some(url.to_string());
        self
    }

    pub fn set_fail_at(&self, stage: FailAt) {
        *self.fail_at.lock() = stage;
    }

    fn fails(&self, stage: FailAt) -> bool {
        *self.fail_at.lock() == stage
    }
}

#[async_trait]
impl RemoteServices for MockServices {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        self.transcriptions.lock().push(audio.clone());
        if self.fails(FailAt::Transcribe) {
            return Err(VoiceTurnError::TranscriptionFailed("HTTP 500".into()));
        }
        Ok(self.transcript.clone())
    }

    async fn reason(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.chats.lock().push(request.clone());
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(Duration::from_secs(10));
        }
        if self.fails(FailAt::Reason) {
            return Err(VoiceTurnError::ReasoningFailed("HTTP 502".into()));
        }
        Ok(ChatReply {
            text: self.reply.clone(),
            awaiting_confirmation: self.awaiting_confirmation,
        })
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioClip> {
        self.speeches.lock().push(request.clone());
        if self.fails(FailAt::Synthesize) {
            return Err(VoiceTurnError::SynthesisFailed("HTTP 503".into()));
        }
        Ok(AudioClip::new(vec![0xFF, 0xFB, 0x90, 0x64], "audio/mpeg"))
    }

    async fn acquire_token(&self, request: &TokenRequest) -> Result<TokenGrant> {
        self.tokens.lock().push(request.clone());
        if self.fails(FailAt::Token) {
            return Err(VoiceTurnError::TransportConnectFailed("HTTP 401".into()));
        }
        Ok(TokenGrant {
            token: "test-token".to_string(),
            url: self.token_url.clone(),
        })
    }

    async fn analyze_image(
        &self,
        _image: &ImageUpload,
        thread_id: &str,
        current_page: &str,
    ) -> Result<ImageAnalysis> {
        self.chats.lock().push(ChatRequest {
            message: "<image>".into(),
            thread_id: thread_id.to_string(),
            current_page: current_page.to_string(),
        });
        Ok(ImageAnalysis {
            interpreted_intent: "Create a trip from this schedule".into(),
            response: "I found a schedule for route 7.".into(),
        })
    }
}

/// How the fake microphone behaves
#[derive(Debug, Clone)]
pub enum MicBehavior {
    /// Produce `bytes` of PCM per take
    Speak { bytes: usize },
    Silent,
    Deny,
    Missing,
}

pub struct FakeMic {
    behavior: MicBehavior,
    pub opened: Arc<Mutex<usize>>,
}

impl FakeMic {
    pub fn new(behavior: MicBehavior) -> Self {
        Self {
            behavior,
            opened: Arc::new(Mutex::new(0)),
        }
    }
}

impl InputDevice for FakeMic {
    fn open(
        &mut self,
        _selector: &DeviceSelector,
        constraints: &CaptureConstraints,
        _timeslice: Duration,
    ) -> Result<Box<dyn CaptureStream>> {
        let bytes = match self.behavior {
            MicBehavior::Speak { bytes } => bytes,
            MicBehavior::Silent => 0,
            MicBehavior::Deny => {
                return Err(VoiceTurnError::PermissionDenied("access refused".into()))
            }
            MicBehavior::Missing => {
                return Err(VoiceTurnError::DeviceUnavailable("no input device".into()))
            }
        };
        *self.opened.lock() += 1;
        Ok(Box::new(FakeStream {
            bytes,
            sample_rate: constraints.sample_rate,
        }))
    }
}

struct FakeStream {
    bytes: usize,
    sample_rate: u32,
}

impl CaptureStream for FakeStream {
    fn format(&self) -> StreamFormat {
        StreamFormat::Pcm16 {
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        if self.bytes == 0 {
            Vec::new()
        } else {
            vec![vec![0x10; self.bytes]]
        }
    }

    fn close(self: Box<Self>) -> Vec<Vec<u8>> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
pub struct SpeakerLog {
    pub active: Option<Uuid>,
    pub started: Vec<Uuid>,
    pub stops: usize,
    pub finished: bool,
}

/// Output that never overlaps clips; finishes only when told to
pub struct FakeSpeaker(pub Arc<Mutex<SpeakerLog>>);

impl FakeSpeaker {
    pub fn new() -> (Self, Arc<Mutex<SpeakerLog>>) {
        let log = Arc::new(Mutex::new(SpeakerLog::default()));
        (Self(Arc::clone(&log)), log)
    }
}

impl AudioOutput for FakeSpeaker {
    fn start(&mut self, clip: &AudioClip) -> Result<()> {
        let mut log = self.0.lock();
        assert!(log.active.is_none(), "two clips audible at once");
        log.active = Some(clip.id());
        log.started.push(clip.id());
        log.finished = false;
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.0.lock();
        if log.active.take().is_some() {
            log.stops += 1;
        }
    }

    fn is_finished(&self) -> bool {
        let log = self.0.lock();
        log.active.is_none() || log.finished
    }
}
