use crate::audio::buffer::AudioClip;
use crate::audio::playback::AudioOutput;
use crate::{Result, VoiceTurnError};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::Cursor;
use tracing::{debug, info};

/// Speaker output through rodio; decodes mp3/wav/ogg replies in memory
pub struct RodioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
}

impl RodioOutput {
    /// Create a new audio output with the default output device
    pub fn new() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default().map_err(|e| {
            VoiceTurnError::PlaybackError(format!("No output device available: {}", e))
        })?;

        info!("Opened default audio output");
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
        })
    }
}

impl AudioOutput for RodioOutput {
    fn start(&mut self, clip: &AudioClip) -> Result<()> {
        self.stop();

        let source = Decoder::new(Cursor::new(clip.shared_bytes())).map_err(|e| {
            VoiceTurnError::PlaybackError(format!("Failed to decode {}: {}", clip.mime_type(), e))
        })?;
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| VoiceTurnError::PlaybackError(format!("Failed to create sink: {}", e)))?;

        sink.append(source);
        self.sink = Some(sink);
        debug!("Started audio playback of clip {}", clip.id());
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
            debug!("Stopped audio playback");
        }
    }

    fn is_finished(&self) -> bool {
        self.sink.as_ref().map(|s| s.empty()).unwrap_or(true)
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_rejects_garbage() {
        // This test might fail in CI environments without audio devices
        if let Ok(mut output) = RodioOutput::new() {
            assert!(output.is_finished());
            let clip = AudioClip::new(vec![0, 1, 2, 3], "audio/mpeg");
            assert!(output.start(&clip).is_err());
            assert!(output.is_finished());
        }
    }
}
