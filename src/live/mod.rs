//! Streaming variant: live transcript reconciliation over a real-time transport

pub mod event;
pub mod session;
pub mod state;
pub mod transport;

pub use event::{EventKind, TransportEvent, AGENT_SPEAKER};
pub use session::LiveSession;
pub use state::{reduce, AssistantState, LiveInput, LiveState, ToolActivity};
pub use transport::{LinkPoll, Transport, TransportFrame, TransportLink, WebSocketTransport};
