use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voiceturn::remote::ImageUpload;
use voiceturn::{ControllerConfig, ControllerEvent, ReleaseOutcome, TurnId, VoiceController};

const HELP: &str = "Commands:
  <Enter>       start talking / send
  r             replay the last reply
  s             stop playback
  i <path>      send an image
  q             quit";

fn load_config() -> Result<ControllerConfig> {
    match std::env::var("VOICETURN_CONFIG") {
        Ok(path) => ControllerConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path)),
        Err(_) => Ok(ControllerConfig::default()),
    }
}

fn image_from_path(path: &str) -> Result<ImageUpload> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
    let mime_type = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    Ok(ImageUpload::new(bytes, mime_type))
}

fn print_event(controller: &VoiceController, event: &ControllerEvent) {
    let content = |id: TurnId| {
        controller
            .log()
            .get(id)
            .map(|turn| turn.content)
            .unwrap_or_default()
    };

    match event {
        ControllerEvent::Transcribed { text, .. } => println!("you> {}", text),
        ControllerEvent::ReplyReady {
            turn_id,
            awaiting_confirmation,
            ..
        } => {
            println!("assistant> {}", content(*turn_id));
            if *awaiting_confirmation {
                println!("(waiting for your confirmation)");
            }
        }
        ControllerEvent::ImageAnalyzed {
            user_turn,
            assistant_turn,
            ..
        } => {
            println!("you (image)> {}", content(*user_turn));
            println!("assistant> {}", content(*assistant_turn));
        }
        ControllerEvent::TurnFailed { notice, .. } => println!("assistant> {}", content(*notice)),
        ControllerEvent::PlaybackFailed { error, .. } => println!("! {}", error.user_message()),
        ControllerEvent::PlaybackStarted(_) | ControllerEvent::PlaybackFinished(_) => {}
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voiceturn=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting voiceturn");

    let mut controller = VoiceController::from_config(load_config()?)?;
    println!("Session {}\n{}", controller.session(), HELP);

    // Stdin is read on its own thread so the controller keeps being polled
    let (line_tx, line_rx) = unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(|l| l.ok()) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut last_reply = None;
    loop {
        match line_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(line) => {
                let line = line.trim();
                match line {
                    "q" => break,
                    "s" => controller.stop_playback(),
                    "r" => match last_reply {
                        Some(turn_id) => {
                            if let Err(e) = controller.replay(turn_id) {
                                println!("! {}", e.user_message());
                            }
                        }
                        None => println!("Nothing to replay yet"),
                    },
                    "" if controller.is_recording() => {
                        let spoken = controller.recording_elapsed();
                        match controller.release() {
                            Ok(ReleaseOutcome::Submitted(_)) => {
                                println!("... thinking ({:.1}s of audio)", spoken.as_secs_f32())
                            }
                            Ok(ReleaseOutcome::Rejected(e)) => {
                                println!("assistant> {}", e.user_message())
                            }
                            Ok(ReleaseOutcome::NotRecording) => {}
                            Err(e) => warn!("Failed to submit recording: {}", e),
                        }
                    }
                    "" => match controller.press() {
                        Ok(()) => println!("... listening (Enter to send)"),
                        Err(e) => println!("! {}", e.user_message()),
                    },
                    other => match other.strip_prefix("i ") {
                        Some(path) => match image_from_path(path.trim()) {
                            Ok(image) => match controller.submit_image(image) {
                                Ok(_) => println!("... looking at the image"),
                                Err(e) => println!("! {}", e.user_message()),
                            },
                            Err(e) => println!("! {:#}", e),
                        },
                        None => println!("{}", HELP),
                    },
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for event in controller.poll() {
            if let ControllerEvent::ReplyReady { turn_id, .. } = event {
                last_reply = Some(turn_id);
            }
            print_event(&controller, &event);
        }
    }

    controller.shutdown();
    Ok(())
}
