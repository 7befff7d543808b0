use crate::{Result, VoiceTurnError};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Convert f32 samples (-1.0..1.0) to little-endian 16-bit PCM bytes
pub fn f32_to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&sample_i16.to_le_bytes());
    }
    bytes
}

/// Wrap little-endian 16-bit PCM bytes in an in-memory WAV container
///
/// # Arguments
/// * `pcm` - Interleaved little-endian i16 samples
/// * `sample_rate` - Sample rate in Hz
/// * `channels` - Number of channels
pub fn encode_pcm16_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(|e| {
            VoiceTurnError::IOError(format!("Failed to create WAV writer: {}", e))
        })?;

        for frame in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([frame[0], frame[1]]))
                .map_err(|e| VoiceTurnError::IOError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| VoiceTurnError::IOError(format!("Failed to finalize WAV: {}", e)))?;
    }

    debug!(
        "Encoded {} PCM bytes as WAV ({} Hz, {} ch)",
        pcm.len(),
        sample_rate,
        channels
    );
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_pcm_conversion_clamps() {
        let bytes = f32_to_pcm16_bytes(&[0.0, 2.0, -2.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
    }

    #[test]
    fn test_encoded_wav_is_readable() {
        let samples: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let pcm = f32_to_pcm16_bytes(&samples);
        let wav = encode_pcm16_wav(&pcm, 48000, 1).unwrap();

        let reader = WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 48000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, samples.len());
    }
}
