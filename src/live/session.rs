use super::event::TransportEvent;
use super::state::{AssistantState, LiveInput, LiveState};
use super::transport::{LinkPoll, Transport, TransportLink};
use crate::config::LiveConfig;
use crate::messages::{ConversationLog, Turn};
use crate::remote::{RemoteServices, TokenRequest};
use crate::session::SessionId;
use crate::{Result, VoiceTurnError};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

/// Driver for one streaming conversation.
///
/// Owns the transport link and the reconciled [`LiveState`]. All methods are
/// called from the caller's thread; `pump` applies whatever arrived since the
/// last call.
pub struct LiveSession {
    config: LiveConfig,
    session: SessionId,
    services: Arc<dyn RemoteServices>,
    transport: Box<dyn Transport>,
    runtime: Runtime,
    link: Option<Box<dyn TransportLink>>,
    state: LiveState,
}

impl LiveSession {
    pub fn new(
        config: LiveConfig,
        session: SessionId,
        services: Arc<dyn RemoteServices>,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            config,
            session,
            services,
            transport,
            runtime,
            link: None,
            state: LiveState::new(),
        })
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    pub fn log(&self) -> &ConversationLog {
        &self.state.log
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Acquire a token and connect.
    ///
    /// Blocks the calling thread until the token request and the transport
    /// handshake finish. That is bounded by the backend request timeout plus
    /// the transport's connect timeout (10 s for
    /// [`WebSocketTransport`](super::WebSocketTransport)), so call it from a
    /// thread that can wait rather than a UI loop.
    ///
    /// On failure an apology turn is logged and the session stays usable, so
    /// `start` can simply be called again.
    pub fn start(&mut self) -> Result<()> {
        if self.link.is_some() {
            debug!("Live session already connected");
            return Ok(());
        }

        match self.connect() {
            Ok(link) => {
                self.link = Some(link);
                info!("Live session {} started", self.session);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start live session: {}", e);
                self.state.log.append(Turn::assistant(e.user_message()));
                Err(e)
            }
        }
    }

    fn connect(&mut self) -> Result<Box<dyn TransportLink>> {
        let request = TokenRequest {
            room_name: self.session.room_name(&self.config.room_prefix),
            participant_name: self.config.participant_name.clone(),
        };
        debug!("Requesting token for room {}", request.room_name);

        let grant = self
            .runtime
            .block_on(self.services.acquire_token(&request))
            .map_err(as_connect_error)?;
        let url = grant.url.unwrap_or_else(|| self.config.server_url.clone());

        self.transport
            .connect(&url, &grant.token)
            .map_err(as_connect_error)
    }

    /// Apply frames received since the last call. Returns how many events
    /// were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;

        loop {
            let Some(link) = self.link.as_mut() else {
                break;
            };

            match link.poll() {
                LinkPoll::Frame(frame) => {
                    if let Some(topic) = &frame.topic {
                        if *topic != self.config.channel {
                            continue;
                        }
                    }
                    match TransportEvent::decode(&frame.payload) {
                        Ok(event) => {
                            debug!("Live event {:?}", event.kind);
                            self.state.apply(LiveInput::Event(event));
                            applied += 1;
                        }
                        Err(e) => warn!("Dropping frame: {}", e),
                    }
                }
                LinkPoll::Empty => break,
                LinkPoll::Closed => {
                    warn!("Live transport closed");
                    self.link = None;
                    self.state.apply(LiveInput::Reset);
                    break;
                }
            }
        }

        applied
    }

    pub fn set_state(&mut self, state: AssistantState) {
        self.state.apply(LiveInput::StateChanged(state));
    }

    /// Feed an interim local recognition result
    pub fn preview(&mut self, text: impl Into<String>) {
        self.state.apply(LiveInput::Preview(text.into()));
    }

    /// Disconnect and discard transient state; logged turns are kept
    pub fn end(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
            info!("Live session {} ended", self.session);
        }
        self.state.apply(LiveInput::Reset);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
        }
    }
}

fn as_connect_error(error: VoiceTurnError) -> VoiceTurnError {
    match error {
        VoiceTurnError::TransportConnectFailed(_) => error,
        other => VoiceTurnError::TransportConnectFailed(other.to_string()),
    }
}
