//! Push-to-talk turn controller
//!
//! Connects all components: Capture -> Transcribe -> Reason -> Synthesize -> Playback.
//! The controller lives on the caller's thread; remote calls run on the
//! pipeline worker and come back as events through [`VoiceController::poll`].

use crate::audio::{AudioOutput, CaptureSession, InputDevice, PlaybackManager};
use crate::config::ControllerConfig;
use crate::messages::{SharedConversationLog, Turn, TurnId};
use crate::pipeline::{PipelineEvent, PipelineWorker, TurnContext};
use crate::remote::{ImageUpload, RemoteServices};
use crate::session::SessionId;
use crate::{Result, VoiceTurnError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Granularity of `wait_event`; capture and playback are serviced at this rate
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What happened on release
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    /// No capture was open
    NotRecording,

    /// The recording went to the pipeline
    Submitted(Uuid),

    /// The recording was discarded; an apology turn was logged
    Rejected(VoiceTurnError),
}

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// User turn appended; reasoning is under way
    Transcribed {
        request_id: Uuid,
        turn_id: TurnId,
        text: String,
    },

    /// Assistant turn appended
    ReplyReady {
        request_id: Uuid,
        turn_id: TurnId,
        awaiting_confirmation: bool,
    },

    /// Image intent and reply appended
    ImageAnalyzed {
        request_id: Uuid,
        user_turn: TurnId,
        assistant_turn: TurnId,
    },

    /// A stage failed; `notice` is the apology turn
    TurnFailed {
        request_id: Uuid,
        error: VoiceTurnError,
        notice: TurnId,
    },

    PlaybackStarted(TurnId),

    PlaybackFinished(TurnId),

    /// The reply could not be played; the turn stays in the log
    PlaybackFailed {
        turn_id: TurnId,
        error: VoiceTurnError,
    },
}

pub struct VoiceController {
    config: ControllerConfig,
    session: SessionId,
    log: SharedConversationLog,
    capture: CaptureSession,
    playback: PlaybackManager,
    worker: PipelineWorker,
    in_flight: Option<Uuid>,
    pending: VecDeque<ControllerEvent>,
}

impl VoiceController {
    /// Create a controller with a fresh session identity
    pub fn new(
        config: ControllerConfig,
        services: Arc<dyn RemoteServices>,
        input: Box<dyn InputDevice>,
        output: Box<dyn AudioOutput>,
    ) -> Result<Self> {
        let session = SessionId::generate();
        let log = SharedConversationLog::new();
        let worker = PipelineWorker::spawn(services, log.clone())?;

        info!("Voice controller ready (session {})", session);
        Ok(Self {
            capture: CaptureSession::new(input, config.capture.clone()),
            playback: PlaybackManager::new(output),
            config,
            session,
            log,
            worker,
            in_flight: None,
            pending: VecDeque::new(),
        })
    }

    /// Create a controller on the system's audio devices and HTTP backend
    #[cfg(feature = "audio-io")]
    pub fn from_config(config: ControllerConfig) -> Result<Self> {
        use crate::audio::{CpalInputDevice, NullOutput, RodioOutput};
        use crate::remote::HttpServices;

        config.validate()?;
        let services = Arc::new(HttpServices::new(config.backend.clone())?);

        let output: Box<dyn AudioOutput> = if config.enable_audio_output {
            match RodioOutput::new() {
                Ok(output) => Box::new(output),
                Err(e) => {
                    warn!("Audio output unavailable, replies will be silent: {}", e);
                    Box::new(NullOutput)
                }
            }
        } else {
            Box::new(NullOutput)
        };

        Self::new(config, services, Box::new(CpalInputDevice::new()), output)
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn log(&self) -> &SharedConversationLog {
        &self.log
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    /// Whether a pipeline run or image analysis is in flight
    pub fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn recording_elapsed(&self) -> Duration {
        self.capture.elapsed()
    }

    pub fn currently_playing(&self) -> Option<TurnId> {
        self.playback.currently_playing()
    }

    fn turn_context(&self) -> TurnContext {
        TurnContext {
            session: self.session.clone(),
            page_context: self.config.page_context.clone(),
            voice: self.config.voice,
        }
    }

    /// Begin a push-to-talk gesture.
    ///
    /// Permission and device errors are returned as blocking notices and are
    /// not logged as turns.
    pub fn press(&mut self) -> Result<()> {
        if self.in_flight.is_some() {
            debug!("Press ignored, request still in flight");
            return Err(VoiceTurnError::PipelineBusy);
        }
        if !self.config.enable_audio_input {
            return Err(VoiceTurnError::DeviceUnavailable(
                "Audio input is disabled".to_string(),
            ));
        }

        self.capture.start(&self.config.input_device)
    }

    /// End the gesture and submit the recording
    pub fn release(&mut self) -> Result<ReleaseOutcome> {
        self.release_at(Instant::now())
    }

    /// Like [`VoiceController::release`], with an explicit end instant
    pub fn release_at(&mut self, ended_at: Instant) -> Result<ReleaseOutcome> {
        let buffer = match self.capture.stop_at(ended_at) {
            Ok(Some(buffer)) => buffer,
            Ok(None) => return Ok(ReleaseOutcome::NotRecording),
            Err(e) => {
                self.log.append(Turn::assistant(e.user_message()));
                return Ok(ReleaseOutcome::Rejected(e));
            }
        };

        let request_id = self.worker.submit(buffer, self.turn_context())?;
        self.in_flight = Some(request_id);
        info!("Submitted recording as request {}", request_id);
        Ok(ReleaseOutcome::Submitted(request_id))
    }

    /// Upload an image for analysis; shares the single-flight slot with voice
    pub fn submit_image(&mut self, image: ImageUpload) -> Result<Uuid> {
        if self.in_flight.is_some() {
            return Err(VoiceTurnError::PipelineBusy);
        }

        let request_id = self.worker.submit_image(image, self.turn_context())?;
        self.in_flight = Some(request_id);
        info!("Submitted image as request {}", request_id);
        Ok(request_id)
    }

    /// Play a past assistant turn again, interrupting current playback
    pub fn replay(&mut self, turn_id: TurnId) -> Result<()> {
        let clip = self
            .log
            .get(turn_id)
            .and_then(|turn| turn.audio)
            .ok_or_else(|| {
                VoiceTurnError::PlaybackError(format!("Turn {} has no audio", turn_id))
            })?;

        self.playback.replay(&clip, turn_id)?;
        self.pending.push_back(ControllerEvent::PlaybackStarted(turn_id));
        Ok(())
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
    }

    /// Service capture, worker events and playback. Never blocks.
    pub fn poll(&mut self) -> Vec<ControllerEvent> {
        self.service();
        self.pending.drain(..).collect()
    }

    /// Block up to `timeout` for the next event
    pub fn wait_event(&mut self, timeout: Duration) -> Option<ControllerEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            self.service();
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            if let Some(event) = self.worker.recv_timeout((deadline - now).min(POLL_INTERVAL)) {
                self.apply(event);
            }
        }
    }

    fn service(&mut self) {
        self.capture.pump();
        while let Some(event) = self.worker.try_recv() {
            self.apply(event);
        }
        if let Some(turn_id) = self.playback.poll() {
            self.pending.push_back(ControllerEvent::PlaybackFinished(turn_id));
        }
    }

    fn finish_request(&mut self, request_id: Uuid) {
        if self.in_flight == Some(request_id) {
            self.in_flight = None;
        } else {
            warn!("Result for unknown request {}", request_id);
        }
    }

    fn apply(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Transcribed {
                request_id,
                turn_id,
                text,
            } => {
                self.pending.push_back(ControllerEvent::Transcribed {
                    request_id,
                    turn_id,
                    text,
                });
            }

            PipelineEvent::Completed {
                request_id,
                outcome,
            } => {
                self.finish_request(request_id);
                let turn_id = outcome.assistant_turn;
                self.pending.push_back(ControllerEvent::ReplyReady {
                    request_id,
                    turn_id,
                    awaiting_confirmation: outcome.awaiting_confirmation,
                });

                match self.playback.play(&outcome.clip, turn_id) {
                    Ok(()) => self.pending.push_back(ControllerEvent::PlaybackStarted(turn_id)),
                    Err(error) => {
                        warn!("Failed to play reply {}: {}", turn_id, error);
                        self.pending
                            .push_back(ControllerEvent::PlaybackFailed { turn_id, error });
                    }
                }
            }

            PipelineEvent::ImageAnalyzed {
                request_id,
                outcome,
            } => {
                self.finish_request(request_id);
                self.pending.push_back(ControllerEvent::ImageAnalyzed {
                    request_id,
                    user_turn: outcome.user_turn,
                    assistant_turn: outcome.assistant_turn,
                });
            }

            PipelineEvent::Failed { request_id, error } => {
                self.finish_request(request_id);
                let notice = self.log.append(Turn::assistant(error.user_message()));
                self.pending.push_back(ControllerEvent::TurnFailed {
                    request_id,
                    error,
                    notice,
                });
            }

            PipelineEvent::Shutdown => {
                if let Some(request_id) = self.in_flight.take() {
                    error!("Pipeline worker stopped with request {} in flight", request_id);
                }
            }
        }
    }

    /// Release the microphone, silence playback and stop the worker
    pub fn shutdown(&mut self) {
        if self.capture.is_recording() {
            // Anything recorded is dropped
            let _ = self.capture.stop();
        }
        self.playback.stop();
        self.worker.shutdown();
        self.in_flight = None;
        info!("Voice controller shut down");
    }
}

impl Drop for VoiceController {
    fn drop(&mut self) {
        if self.capture.is_recording() {
            let _ = self.capture.stop();
        }
        self.playback.stop();
    }
}
