use crate::audio::capture::{CaptureConstraints, CaptureStream, DeviceSelector, InputDevice, StreamFormat};
use crate::audio::wav::f32_to_pcm16_bytes;
use crate::{Result, VoiceTurnError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, Host, SampleFormat, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Microphone input through the platform's default cpal host
pub struct CpalInputDevice {
    host: Host,
}

impl CpalInputDevice {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn find_device(&self, selector: &DeviceSelector) -> Result<Device> {
        match selector {
            DeviceSelector::SystemDefault => self.host.default_input_device().ok_or_else(|| {
                VoiceTurnError::DeviceUnavailable("No input device available".into())
            }),
            DeviceSelector::Named(name) => {
                let mut devices = self.host.input_devices().map_err(|e| {
                    classify_backend_error(format!("Failed to enumerate input devices: {}", e))
                })?;
                devices
                    .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                    .ok_or_else(|| {
                        VoiceTurnError::DeviceUnavailable(format!("Input device not found: {}", name))
                    })
            }
        }
    }

    /// Pick an f32 config at the requested rate, falling back to the device default
    fn stream_config(device: &Device, constraints: &CaptureConstraints) -> Result<StreamConfig> {
        let target = SampleRate(constraints.sample_rate);

        if let Ok(mut ranges) = device.supported_input_configs() {
            let matching = ranges.find(|range| {
                range.sample_format() == SampleFormat::F32
                    && range.channels() == constraints.channel_count
                    && range.min_sample_rate() <= target
                    && range.max_sample_rate() >= target
            });
            if let Some(range) = matching {
                return Ok(range.with_sample_rate(target).into());
            }
        }

        debug!(
            "No {}Hz/{}ch f32 input config, using device default",
            constraints.sample_rate, constraints.channel_count
        );
        device
            .default_input_config()
            .map(Into::into)
            .map_err(|e| classify_backend_error(format!("Failed to get input config: {}", e)))
    }
}

impl Default for CpalInputDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDevice for CpalInputDevice {
    fn open(
        &mut self,
        selector: &DeviceSelector,
        constraints: &CaptureConstraints,
        timeslice: Duration,
    ) -> Result<Box<dyn CaptureStream>> {
        let device = self.find_device(selector)?;
        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        debug!(
            "Platform DSP constraints (echo_cancellation={}, noise_suppression={}, auto_gain_control={}) are not exposed by cpal",
            constraints.echo_cancellation, constraints.noise_suppression, constraints.auto_gain_control
        );

        let config = Self::stream_config(&device, constraints)?;
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        // Mono bytes per timeslice
        let chunk_bytes =
            ((sample_rate as u128 * timeslice.as_millis() / 1000) as usize).max(1) * 2;

        let (chunk_tx, chunk_rx) = unbounded();
        let pending = Arc::new(Mutex::new(Vec::with_capacity(chunk_bytes)));
        let pending_cb = Arc::clone(&pending);

        let err_fn = |err| {
            error!("Audio input stream error: {}", err);
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Convert to mono if necessary
                    let samples = if channels == 1 {
                        f32_to_pcm16_bytes(data)
                    } else {
                        let mono: Vec<f32> = data
                            .chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                            .collect();
                        f32_to_pcm16_bytes(&mono)
                    };

                    let mut pending = pending_cb.lock();
                    pending.extend_from_slice(&samples);
                    if pending.len() >= chunk_bytes {
                        let chunk = std::mem::take(&mut *pending);
                        if let Err(e) = chunk_tx.send(chunk) {
                            debug!("Failed to send audio chunk: {}", e);
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| match e {
                BuildStreamError::DeviceNotAvailable => {
                    VoiceTurnError::DeviceUnavailable("Input device disconnected".into())
                }
                other => classify_backend_error(format!("Failed to build input stream: {}", other)),
            })?;

        stream
            .play()
            .map_err(|e| classify_backend_error(format!("Failed to start input stream: {}", e)))?;

        info!("Started audio input at {}Hz ({} ch -> mono)", sample_rate, channels);
        Ok(Box::new(CpalCaptureStream {
            stream,
            chunk_rx,
            pending,
            sample_rate,
        }))
    }
}

struct CpalCaptureStream {
    stream: Stream,
    chunk_rx: Receiver<Vec<u8>>,
    pending: Arc<Mutex<Vec<u8>>>,
    sample_rate: u32,
}

impl CaptureStream for CpalCaptureStream {
    fn format(&self) -> StreamFormat {
        StreamFormat::Pcm16 {
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        self.chunk_rx.try_iter().collect()
    }

    fn close(self: Box<Self>) -> Vec<Vec<u8>> {
        let CpalCaptureStream {
            stream,
            chunk_rx,
            pending,
            ..
        } = *self;
        drop(stream);
        info!("Stopped audio input");

        let mut chunks: Vec<Vec<u8>> = chunk_rx.try_iter().collect();
        let tail = std::mem::take(&mut *pending.lock());
        if !tail.is_empty() {
            chunks.push(tail);
        }
        chunks
    }
}

/// Backends report refused access through free-form messages
fn classify_backend_error(message: String) -> VoiceTurnError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        VoiceTurnError::PermissionDenied(message)
    } else {
        VoiceTurnError::DeviceUnavailable(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_backend_error() {
        assert!(matches!(
            classify_backend_error("Access denied by the system".into()),
            VoiceTurnError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_backend_error("ALSA function failed".into()),
            VoiceTurnError::DeviceUnavailable(_)
        ));
    }

    #[test]
    fn test_open_default_device() {
        // This test might fail in CI environments without audio devices
        let mut input = CpalInputDevice::new();
        if let Ok(stream) = input.open(
            &DeviceSelector::SystemDefault,
            &CaptureConstraints::default(),
            Duration::from_millis(100),
        ) {
            assert!(matches!(stream.format(), StreamFormat::Pcm16 { channels: 1, .. }));
            let _ = stream.close();
        }
    }
}
