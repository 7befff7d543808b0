//! Turn pipeline: transcribe -> reason -> synthesize
//!
//! [`TurnPipeline`] runs the three remote stages strictly in sequence and
//! appends the resulting turns to the conversation log. [`PipelineWorker`]
//! drives it from a dedicated thread with a channel-based interface, so the
//! caller's event loop never blocks on the network.

use crate::audio::{AudioBuffer, AudioClip};
use crate::config::VoicePersona;
use crate::messages::{SharedConversationLog, Turn, TurnId};
use crate::remote::{ChatRequest, ImageUpload, RemoteServices, SpeechRequest};
use crate::session::SessionId;
use crate::{Result, VoiceTurnError};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::Builder;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-turn values threaded through every remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnContext {
    pub session: SessionId,
    pub page_context: String,
    pub voice: VoicePersona,
}

/// Latency of each stage in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub transcribe_ms: u64,
    pub reason_ms: u64,
    pub synthesize_ms: u64,
}

impl StageTimings {
    pub fn total_ms(&self) -> u64 {
        self.transcribe_ms + self.reason_ms + self.synthesize_ms
    }
}

/// Result of a fully successful pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub user_turn: TurnId,
    pub assistant_turn: TurnId,
    pub transcript: String,
    pub reply: String,
    pub clip: AudioClip,
    pub awaiting_confirmation: bool,
    pub timings: StageTimings,
}

/// Result of an image analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutcome {
    pub user_turn: TurnId,
    pub assistant_turn: TurnId,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

pub struct TurnPipeline {
    services: Arc<dyn RemoteServices>,
    log: SharedConversationLog,
}

impl TurnPipeline {
    pub fn new(services: Arc<dyn RemoteServices>, log: SharedConversationLog) -> Self {
        Self { services, log }
    }

    /// Run all three stages for one recording
    pub async fn run(&self, audio: AudioBuffer, context: &TurnContext) -> Result<PipelineOutcome> {
        self.run_with_progress(audio, context, |_, _| {}).await
    }

    /// Like [`TurnPipeline::run`]; `on_transcribed` is called right after the
    /// user turn is appended, before reasoning starts.
    pub async fn run_with_progress<F>(
        &self,
        audio: AudioBuffer,
        context: &TurnContext,
        on_transcribed: F,
    ) -> Result<PipelineOutcome>
    where
        F: FnOnce(TurnId, &str) + Send,
    {
        let mut timings = StageTimings::default();

        let start = Instant::now();
        let transcript = self.services.transcribe(&audio).await?;
        timings.transcribe_ms = elapsed_ms(start);
        if transcript.trim().is_empty() {
            return Err(VoiceTurnError::TranscriptionFailed(
                "No speech recognized".to_string(),
            ));
        }

        // The user's words are logged even if a later stage fails
        let user_turn = self.log.append(Turn::user(transcript.clone()));
        debug!("Transcribed in {}ms: {:?}", timings.transcribe_ms, transcript);
        on_transcribed(user_turn, &transcript);

        let start = Instant::now();
        let reply = self
            .services
            .reason(&ChatRequest {
                message: transcript.clone(),
                thread_id: context.session.to_string(),
                current_page: context.page_context.clone(),
            })
            .await?;
        timings.reason_ms = elapsed_ms(start);

        let start = Instant::now();
        let clip = self
            .services
            .synthesize(&SpeechRequest {
                text: reply.text.clone(),
                voice: context.voice.to_string(),
            })
            .await?;
        timings.synthesize_ms = elapsed_ms(start);

        let assistant_turn = self
            .log
            .append(Turn::assistant(reply.text.clone()).with_audio(clip.clone()));

        info!(
            "Turn complete in {}ms (transcribe {}ms, reason {}ms, synthesize {}ms)",
            timings.total_ms(),
            timings.transcribe_ms,
            timings.reason_ms,
            timings.synthesize_ms
        );

        Ok(PipelineOutcome {
            user_turn,
            assistant_turn,
            transcript,
            reply: reply.text,
            clip,
            awaiting_confirmation: reply.awaiting_confirmation,
            timings,
        })
    }

    /// Upload an image; the interpreted intent and the reply are logged as a
    /// user/assistant pair without audio
    pub async fn analyze_image(
        &self,
        image: &ImageUpload,
        context: &TurnContext,
    ) -> Result<ImageOutcome> {
        let start = Instant::now();
        let analysis = self
            .services
            .analyze_image(image, context.session.as_str(), &context.page_context)
            .await?;
        debug!("Image analyzed in {}ms", elapsed_ms(start));

        let user_turn = self.log.append(Turn::user(analysis.interpreted_intent));
        let assistant_turn = self.log.append(Turn::assistant(analysis.response));
        Ok(ImageOutcome {
            user_turn,
            assistant_turn,
        })
    }
}

/// Commands that can be sent to the pipeline worker
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Process one recording
    Run {
        request_id: Uuid,
        audio: AudioBuffer,
        context: TurnContext,
    },

    /// Process one image
    AnalyzeImage {
        request_id: Uuid,
        image: ImageUpload,
        context: TurnContext,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Events emitted by the pipeline worker
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The user turn was appended; reasoning is under way
    Transcribed {
        request_id: Uuid,
        turn_id: TurnId,
        text: String,
    },

    /// All stages succeeded
    Completed {
        request_id: Uuid,
        outcome: PipelineOutcome,
    },

    ImageAnalyzed {
        request_id: Uuid,
        outcome: ImageOutcome,
    },

    /// A stage failed; no further stages ran
    Failed {
        request_id: Uuid,
        error: VoiceTurnError,
    },

    /// Worker has shut down
    Shutdown,
}

/// Pipeline running on its own thread
pub struct PipelineWorker {
    command_tx: Sender<PipelineCommand>,
    event_rx: Receiver<PipelineEvent>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    /// Spawn the worker thread
    pub fn spawn(services: Arc<dyn RemoteServices>, log: SharedConversationLog) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let handle = std::thread::Builder::new()
            .name("voiceturn-pipeline".to_string())
            .spawn(move || run_worker(TurnPipeline::new(services, log), command_rx, event_tx))?;

        Ok(Self {
            command_tx,
            event_rx,
            handle: Some(handle),
        })
    }

    /// Queue a recording; returns its request id
    pub fn submit(&self, audio: AudioBuffer, context: TurnContext) -> Result<Uuid> {
        let request_id = Uuid::new_v4();
        self.send(PipelineCommand::Run {
            request_id,
            audio,
            context,
        })?;
        Ok(request_id)
    }

    pub fn submit_image(&self, image: ImageUpload, context: TurnContext) -> Result<Uuid> {
        let request_id = Uuid::new_v4();
        self.send(PipelineCommand::AnalyzeImage {
            request_id,
            image,
            context,
        })?;
        Ok(request_id)
    }

    fn send(&self, command: PipelineCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| VoiceTurnError::ChannelError(format!("Pipeline worker is gone: {}", e)))
    }

    pub fn try_recv(&self) -> Option<PipelineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<PipelineEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // Avoid spinning on a dead channel
                std::thread::sleep(timeout);
                None
            }
        }
    }

    /// Stop the worker and wait for the in-flight request, if any, to finish
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.command_tx.send(PipelineCommand::Shutdown);
        if handle.join().is_err() {
            error!("Pipeline worker panicked");
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        // Detach instead of joining; a request may be waiting on the network
        if self.handle.take().is_some() {
            let _ = self.command_tx.send(PipelineCommand::Shutdown);
        }
    }
}

fn run_worker(
    pipeline: TurnPipeline,
    command_rx: Receiver<PipelineCommand>,
    event_tx: Sender<PipelineEvent>,
) {
    info!("Pipeline worker starting");

    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            // Fail every request that arrives instead of silently dropping it
            for command in command_rx.iter() {
                let request_id = match command {
                    PipelineCommand::Run { request_id, .. }
                    | PipelineCommand::AnalyzeImage { request_id, .. } => request_id,
                    PipelineCommand::Shutdown => break,
                };
                let _ = event_tx.send(PipelineEvent::Failed {
                    request_id,
                    error: VoiceTurnError::ChannelError(format!("Runtime creation failed: {}", e)),
                });
            }
            let _ = event_tx.send(PipelineEvent::Shutdown);
            return;
        }
    };

    loop {
        match command_rx.recv() {
            Ok(PipelineCommand::Run {
                request_id,
                audio,
                context,
            }) => {
                debug!(
                    "Processing request {} ({} bytes, {}ms)",
                    request_id,
                    audio.len(),
                    audio.duration().as_millis()
                );

                let progress_tx = event_tx.clone();
                let result = runtime.block_on(pipeline.run_with_progress(
                    audio,
                    &context,
                    move |turn_id, text| {
                        let _ = progress_tx.send(PipelineEvent::Transcribed {
                            request_id,
                            turn_id,
                            text: text.to_string(),
                        });
                    },
                ));

                let event = match result {
                    Ok(outcome) => PipelineEvent::Completed {
                        request_id,
                        outcome,
                    },
                    Err(error) => {
                        warn!("Request {} failed: {}", request_id, error);
                        PipelineEvent::Failed { request_id, error }
                    }
                };
                let _ = event_tx.send(event);
            }

            Ok(PipelineCommand::AnalyzeImage {
                request_id,
                image,
                context,
            }) => {
                debug!("Processing image request {} ({} bytes)", request_id, image.bytes.len());
                let event = match runtime.block_on(pipeline.analyze_image(&image, &context)) {
                    Ok(outcome) => PipelineEvent::ImageAnalyzed {
                        request_id,
                        outcome,
                    },
                    Err(error) => {
                        warn!("Image request {} failed: {}", request_id, error);
                        PipelineEvent::Failed { request_id, error }
                    }
                };
                let _ = event_tx.send(event);
            }

            Ok(PipelineCommand::Shutdown) => {
                info!("Pipeline worker shutting down");
                let _ = event_tx.send(PipelineEvent::Shutdown);
                break;
            }

            Err(_) => {
                debug!("Command channel closed");
                break;
            }
        }
    }

    info!("Pipeline worker stopped");
}
