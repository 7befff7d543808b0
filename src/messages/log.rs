use super::types::{Role, ToolStatus, Turn, TurnId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Append-only, insertion-ordered record of turns
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) -> TurnId {
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of turns with the given role
    pub fn count_role(&self, role: Role) -> usize {
        self.turns.iter().filter(|t| t.role == role).count()
    }

    /// Check whether the immediately preceding turn has this role and content
    pub fn last_matches(&self, role: Role, content: &str) -> bool {
        self.last()
            .map(|t| t.role == role && t.content == content)
            .unwrap_or(false)
    }

    /// Resolve the most recent pending tool turn for `tool_name`
    pub fn resolve_tool(
        &mut self,
        tool_name: &str,
        status: ToolStatus,
        content: &str,
    ) -> Option<TurnId> {
        let turn = self
            .turns
            .iter_mut()
            .rev()
            .find(|t| t.is_pending_tool(tool_name))?;

        if turn.resolve_tool(status, content) {
            Some(turn.id)
        } else {
            None
        }
    }
}

/// Thread-safe handle to a conversation log.
///
/// Producers only ever append complete turns, so readers never observe a
/// half-built turn.
#[derive(Debug, Clone, Default)]
pub struct SharedConversationLog {
    inner: Arc<RwLock<ConversationLog>>,
}

impl SharedConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, turn: Turn) -> TurnId {
        self.inner.write().append(turn)
    }

    pub fn get(&self, id: TurnId) -> Option<Turn> {
        self.inner.read().get(id).cloned()
    }

    pub fn last(&self) -> Option<Turn> {
        self.inner.read().last().cloned()
    }

    /// Copy of all turns (no lock held after return)
    pub fn snapshot(&self) -> Vec<Turn> {
        self.inner.read().turns().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
