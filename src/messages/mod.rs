pub mod log;
pub mod types;

pub use log::{ConversationLog, SharedConversationLog};
pub use types::{Role, ToolMeta, ToolStatus, Turn, TurnId};
