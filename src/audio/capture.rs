//! Capture session: exclusive ownership of the input device for one gesture
//!
//! A session is opened on press (`start`) and finalized on release (`stop`).
//! Device access sits behind [`InputDevice`] so the session logic does not
//! depend on a particular audio backend.

use crate::audio::buffer::AudioBuffer;
use crate::audio::wav::{encode_pcm16_wav, WAV_MIME_TYPE};
use crate::config::CaptureConfig;
use crate::{Result, VoiceTurnError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which input device to open
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelector {
    #[default]
    SystemDefault,
    Named(String),
}

/// Constraints requested when opening the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    /// Off to preserve voice energy, at the cost of background noise
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub channel_count: u16,
    pub sample_rate: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: false,
            auto_gain_control: true,
            channel_count: 1,
            sample_rate: 48000,
        }
    }
}

/// Layout of the chunks a stream produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFormat {
    /// Raw interleaved little-endian i16 samples; wrapped in WAV at stop
    Pcm16 { sample_rate: u32, channels: u16 },
    /// Already-encoded container chunks, concatenated as-is
    Encoded { mime_type: String },
}

/// An audio backend able to open input streams
pub trait InputDevice {
    /// Open the device. Must fail with `DeviceUnavailable` or
    /// `PermissionDenied` when the device cannot be acquired.
    fn open(
        &mut self,
        selector: &DeviceSelector,
        constraints: &CaptureConstraints,
        timeslice: Duration,
    ) -> Result<Box<dyn CaptureStream>>;
}

/// An open input stream delivering chunks every timeslice
pub trait CaptureStream {
    fn format(&self) -> StreamFormat;

    /// Chunks produced since the last call
    fn take_chunks(&mut self) -> Vec<Vec<u8>>;

    /// Stop the stream, release the device and return any trailing chunks
    fn close(self: Box<Self>) -> Vec<Vec<u8>>;
}

struct ActiveCapture {
    stream: Box<dyn CaptureStream>,
    chunks: Vec<Vec<u8>>,
    started_at: Instant,
}

pub struct CaptureSession {
    device: Box<dyn InputDevice>,
    config: CaptureConfig,
    active: Option<ActiveCapture>,
}

impl CaptureSession {
    pub fn new(device: Box<dyn InputDevice>, config: CaptureConfig) -> Self {
        Self {
            device,
            config,
            active: None,
        }
    }

    /// Open the device and start buffering
    pub fn start(&mut self, selector: &DeviceSelector) -> Result<()> {
        if self.active.is_some() {
            warn!("Capture already in progress");
            return Err(VoiceTurnError::CaptureBusy);
        }

        let stream = self.device.open(
            selector,
            &self.config.constraints,
            self.config.timeslice(),
        )?;

        self.active = Some(ActiveCapture {
            stream,
            chunks: Vec::new(),
            started_at: Instant::now(),
        });

        info!("Started capture on {:?}", selector);
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.active.as_ref().map(|a| a.started_at)
    }

    /// Time since `start`, or zero when idle
    pub fn elapsed(&self) -> Duration {
        self.active
            .as_ref()
            .map(|a| a.started_at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Move chunks produced since the last call into the session buffer.
    ///
    /// Returns the number of bytes buffered so far.
    pub fn pump(&mut self) -> usize {
        match &mut self.active {
            Some(active) => {
                let fresh = active.stream.take_chunks();
                active.chunks.extend(fresh);
                active.chunks.iter().map(Vec::len).sum()
            }
            None => 0,
        }
    }

    /// Finalize the recording. Stopping an idle session is a no-op (`Ok(None)`).
    pub fn stop(&mut self) -> Result<Option<AudioBuffer>> {
        self.stop_at(Instant::now())
    }

    /// Like [`CaptureSession::stop`], with an explicit end instant for the
    /// duration timer
    pub fn stop_at(&mut self, ended_at: Instant) -> Result<Option<AudioBuffer>> {
        let Some(mut active) = self.active.take() else {
            debug!("Stop requested with no capture open");
            return Ok(None);
        };

        let duration = ended_at.saturating_duration_since(active.started_at);
        let format = active.stream.format();

        active.chunks.extend(active.stream.take_chunks());
        // Device is released here, before validation
        active.chunks.extend(active.stream.close());

        let raw: Vec<u8> = active.chunks.concat();
        info!(
            "Stopped capture: {} bytes in {} chunks over {}ms",
            raw.len(),
            active.chunks.len(),
            duration.as_millis()
        );

        let (bytes, mime_type) = match format {
            StreamFormat::Pcm16 { .. } if raw.is_empty() => (raw, WAV_MIME_TYPE.to_string()),
            StreamFormat::Pcm16 { sample_rate, channels } => (
                encode_pcm16_wav(&raw, sample_rate, channels)?,
                WAV_MIME_TYPE.to_string(),
            ),
            StreamFormat::Encoded { mime_type } => (raw, mime_type),
        };

        AudioBuffer::new(bytes, mime_type, duration)
            .validate(self.config.min_duration())
            .map(Some)
            .map_err(|e| {
                warn!("Discarding recording: {}", e);
                e
            })
    }
}
