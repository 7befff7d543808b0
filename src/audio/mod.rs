pub mod buffer;
pub mod capture;
#[cfg(feature = "audio-io")]
pub mod input;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod playback;
pub mod wav;

pub use buffer::{AudioBuffer, AudioClip, MIN_RECORDING_DURATION};
pub use capture::{
    CaptureConstraints, CaptureSession, CaptureStream, DeviceSelector, InputDevice, StreamFormat,
};
#[cfg(feature = "audio-io")]
pub use input::CpalInputDevice;
#[cfg(feature = "audio-io")]
pub use output::RodioOutput;
pub use playback::{AudioOutput, NullOutput, PlaybackManager};
