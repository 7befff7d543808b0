use crate::{Result, VoiceTurnError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Recordings shorter than this are discarded
pub const MIN_RECORDING_DURATION: Duration = Duration::from_millis(500);

/// Finished recording of one press-and-release gesture
#[derive(Clone)]
pub struct AudioBuffer {
    bytes: Arc<[u8]>,
    mime_type: String,
    duration: Duration,
}

impl AudioBuffer {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, duration: Duration) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            duration,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check eligibility for submission.
    ///
    /// Duration is checked before size, so a short silent gesture reports
    /// `RecordingTooShort`.
    pub fn validate(self, min_duration: Duration) -> Result<Self> {
        if self.duration < min_duration {
            return Err(VoiceTurnError::RecordingTooShort {
                duration_ms: self.duration.as_millis() as u64,
                min_ms: min_duration.as_millis() as u64,
            });
        }
        if self.bytes.is_empty() {
            return Err(VoiceTurnError::EmptyRecording);
        }
        Ok(self)
    }

    /// File name used when uploading, so the server can sniff the container
    pub fn file_name(&self) -> &'static str {
        let mime = self.mime_type.to_ascii_lowercase();
        if mime.starts_with("audio/mp4") || mime.starts_with("audio/m4a") {
            "recording.mp4"
        } else if mime.starts_with("audio/wav") || mime.starts_with("audio/x-wav") {
            "recording.wav"
        } else if mime.starts_with("audio/ogg") {
            "recording.ogg"
        } else {
            "recording.webm"
        }
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("duration", &self.duration)
            .finish()
    }
}

/// Playable audio handle attached to assistant turns
#[derive(Clone)]
pub struct AudioClip {
    id: Uuid,
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the encoded bytes, for decoders that need ownership
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("id", &self.id)
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl PartialEq for AudioClip {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
