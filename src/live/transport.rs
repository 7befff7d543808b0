//! Real-time transport carrying agent events
//!
//! A [`Transport`] opens a [`TransportLink`]; the link is polled from the
//! caller's thread and never blocks.

use crate::{Result, VoiceTurnError};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use futures_util::StreamExt;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// One data message received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFrame {
    /// Logical channel; `None` when the transport has no notion of topics
    pub topic: Option<String>,
    pub payload: Vec<u8>,
}

impl TransportFrame {
    pub fn new(topic: Option<&str>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.map(str::to_string),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPoll {
    Frame(TransportFrame),
    /// Nothing pending right now
    Empty,
    /// The remote side went away; no more frames will arrive
    Closed,
}

pub trait Transport {
    /// Connect to `url` authenticating with `token`
    fn connect(&mut self, url: &str, token: &str) -> Result<Box<dyn TransportLink>>;
}

pub trait TransportLink {
    fn poll(&mut self) -> LinkPoll;

    /// Tear the connection down and release its resources
    fn close(self: Box<Self>);
}

/// WebSocket transport; each link runs its socket on a dedicated thread
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str, token: &str) -> Result<Box<dyn TransportLink>> {
        let fail = VoiceTurnError::TransportConnectFailed;

        let mut request = url.into_client_request().map_err(|e| fail(e.to_string()))?;
        let bearer =
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| fail(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (frame_tx, frame_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let target = url.to_string();
        let handle = std::thread::Builder::new()
            .name("voiceturn-transport".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create tokio runtime: {}", e);
                        let _ = ready_tx.send(Err(fail(format!("Runtime creation failed: {}", e))));
                        return;
                    }
                };
                runtime.block_on(run_socket(request, target, ready_tx, frame_tx, shutdown_rx));
            })?;

        match ready_rx.recv_timeout(self.connect_timeout) {
            Ok(Ok(())) => Ok(Box::new(WebSocketLink {
                frames: frame_rx,
                shutdown: Some(shutdown_tx),
                handle: Some(handle),
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                // The socket thread exits on its own once the shutdown sender is dropped
                drop(shutdown_tx);
                Err(fail(format!(
                    "Timed out after {}s connecting to {}",
                    self.connect_timeout.as_secs(),
                    url
                )))
            }
        }
    }
}

async fn run_socket(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    url: String,
    ready_tx: Sender<Result<()>>,
    frame_tx: Sender<TransportFrame>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ws = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", url, e);
            let _ = ready_tx.send(Err(VoiceTurnError::TransportConnectFailed(e.to_string())));
            return;
        }
    };

    info!("Connected to {}", url);
    if ready_tx.send(Ok(())).is_err() {
        // Caller gave up waiting
        let _ = ws.close(None).await;
        return;
    }

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("Closing connection to {}", url);
                let _ = ws.close(None).await;
                break;
            }
            message = ws.next() => {
                let payload = match message {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Close(frame))) => {
                        info!("Server closed connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Connection to {} failed: {}", url, e);
                        break;
                    }
                    None => break,
                };
                if frame_tx.send(TransportFrame::new(None, payload)).is_err() {
                    break;
                }
            }
        }
    }

    info!("Disconnected from {}", url);
}

struct WebSocketLink {
    frames: Receiver<TransportFrame>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TransportLink for WebSocketLink {
    fn poll(&mut self) -> LinkPoll {
        match self.frames.try_recv() {
            Ok(frame) => LinkPoll::Frame(frame),
            Err(TryRecvError::Empty) => LinkPoll::Empty,
            Err(TryRecvError::Disconnected) => LinkPoll::Closed,
        }
    }

    fn close(mut self: Box<Self>) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Transport thread panicked");
            }
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
