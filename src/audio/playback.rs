//! Single-flight playback of assistant replies

use crate::audio::buffer::AudioClip;
use crate::messages::TurnId;
use crate::Result;
use tracing::{debug, info};

/// Audio output backend. Only one clip is active at a time.
pub trait AudioOutput {
    /// Start playing a clip. Any clip already started must have been stopped
    /// by the caller.
    fn start(&mut self, clip: &AudioClip) -> Result<()>;

    /// Stop and release the current clip
    fn stop(&mut self);

    /// Whether the current clip finished (or nothing was started)
    fn is_finished(&self) -> bool;
}

/// Output used when audio playback is disabled; every clip finishes immediately
#[derive(Debug, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn start(&mut self, clip: &AudioClip) -> Result<()> {
        debug!("Audio output disabled, skipping {} bytes", clip.len());
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_finished(&self) -> bool {
        true
    }
}

/// Owns the output channel. At most one turn is audible at any moment.
pub struct PlaybackManager {
    output: Box<dyn AudioOutput>,
    current: Option<TurnId>,
}

impl PlaybackManager {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            current: None,
        }
    }

    /// Play `clip` for `turn_id`, stopping whatever is currently playing
    pub fn play(&mut self, clip: &AudioClip, turn_id: TurnId) -> Result<()> {
        if let Some(previous) = self.current.take() {
            debug!("Stopping playback of turn {} for {}", previous, turn_id);
        }
        self.output.stop();

        self.output.start(clip)?;
        self.current = Some(turn_id);
        info!("Playing {} bytes for turn {}", clip.len(), turn_id);
        Ok(())
    }

    /// Re-trigger playback of a past turn; same contract as `play`
    pub fn replay(&mut self, clip: &AudioClip, turn_id: TurnId) -> Result<()> {
        debug!("Replay requested for turn {}", turn_id);
        self.play(clip, turn_id)
    }

    pub fn stop(&mut self) {
        if let Some(turn_id) = self.current.take() {
            self.output.stop();
            debug!("Stopped playback of turn {}", turn_id);
        }
    }

    pub fn is_playing(&self, turn_id: TurnId) -> bool {
        self.current == Some(turn_id)
    }

    pub fn currently_playing(&self) -> Option<TurnId> {
        self.current
    }

    /// Detect natural completion. Returns the turn that just finished.
    pub fn poll(&mut self) -> Option<TurnId> {
        if self.current.is_some() && self.output.is_finished() {
            let finished = self.current.take();
            debug!("Playback finished for {:?}", finished);
            return finished;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VoiceTurnError;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use uuid::Uuid;

    #[derive(Default)]
    struct OutputLog {
        active: Option<Uuid>,
        started: Vec<Uuid>,
        stops: usize,
        finished: bool,
        fail: bool,
    }

    struct FakeOutput(Arc<Mutex<OutputLog>>);

    impl AudioOutput for FakeOutput {
        fn start(&mut self, clip: &AudioClip) -> Result<()> {
            let mut log = self.0.lock();
            if log.fail {
                return Err(VoiceTurnError::PlaybackError("decode failed".into()));
            }
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
            self.0.lock().finished
        }
    }

    fn manager() -> (PlaybackManager, Arc<Mutex<OutputLog>>) {
        let log = Arc::new(Mutex::new(OutputLog::default()));
        (PlaybackManager::new(Box::new(FakeOutput(Arc::clone(&log)))), log)
    }

    #[test]
    fn test_second_play_stops_first() {
        let (mut playback, log) = manager();
        let first = AudioClip::new(vec![1], "audio/mpeg");
        let second = AudioClip::new(vec![2], "audio/mpeg");
        let (turn_a, turn_b) = (Uuid::new_v4(), Uuid::new_v4());

        playback.play(&first, turn_a).unwrap();
        playback.play(&second, turn_b).unwrap();

        assert!(!playback.is_playing(turn_a));
        assert!(playback.is_playing(turn_b));
        let log = log.lock();
        assert_eq!(log.active, Some(second.id()));
        assert_eq!(log.stops, 1);
    }

    #[test]
    fn test_natural_completion_clears_marker() {
        let (mut playback, log) = manager();
        let turn = Uuid::new_v4();
        playback.play(&AudioClip::new(vec![1], "audio/mpeg"), turn).unwrap();
        assert_eq!(playback.poll(), None);

        log.lock().finished = true;
        assert_eq!(playback.poll(), Some(turn));
        assert_eq!(playback.currently_playing(), None);
        assert_eq!(playback.poll(), None);
    }

    #[test]
    fn test_replay_interrupts_current() {
        let (mut playback, log) = manager();
        let clip = AudioClip::new(vec![1], "audio/mpeg");
        let (old_turn, new_turn) = (Uuid::new_v4(), Uuid::new_v4());

        playback.play(&AudioClip::new(vec![2], "audio/mpeg"), new_turn).unwrap();
        playback.replay(&clip, old_turn).unwrap();

        assert!(playback.is_playing(old_turn));
        assert_eq!(log.lock().started.len(), 2);
    }

    #[test]
    fn test_failed_start_leaves_nothing_playing() {
        let (mut playback, log) = manager();
        let turn = Uuid::new_v4();
        playback.play(&AudioClip::new(vec![1], "audio/mpeg"), turn).unwrap();

        log.lock().fail = true;
        assert!(playback.play(&AudioClip::new(vec![2], "audio/mpeg"), Uuid::new_v4()).is_err());
        assert_eq!(playback.currently_playing(), None);
        assert!(log.lock().active.is_none());
    }

    #[test]
    fn test_stop() {
        let (mut playback, _) = manager();
        let turn = Uuid::new_v4();
        playback.play(&AudioClip::new(vec![1], "audio/mpeg"), turn).unwrap();
        playback.stop();
        assert!(!playback.is_playing(turn));
    }
}
