//! Live transcript reconciliation
//!
//! Merges the local speech preview with authoritative transcription and tool
//! events into one ordered conversation log. [`reduce`] is a pure function of
//! the previous state and one input; nothing here touches I/O.

use super::event::{EventKind, TransportEvent};
use crate::messages::{ConversationLog, Role, ToolStatus, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What the assistant is doing, as reported by the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

/// A server-side tool call that has not reported a result yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolActivity {
    pub tool_name: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveInput {
    StateChanged(AssistantState),
    /// Interim local recognition result
    Preview(String),
    Event(TransportEvent),
    /// Session ended or disconnected
    Reset,
}

#[derive(Debug, Clone, Default)]
pub struct LiveState {
    pub interaction: AssistantState,
    /// Non-authoritative text of what the user is saying right now
    pub preview: String,
    /// In-flight tool calls, oldest first
    pub tool_activity: Vec<ToolActivity>,
    pub log: ConversationLog,
}

/// Apply one input to `state`
pub fn reduce(mut state: LiveState, input: LiveInput) -> LiveState {
    state.apply(input);
    state
}

impl LiveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, input: LiveInput) {
        match input {
            LiveInput::StateChanged(next) => self.change_state(next),
            LiveInput::Preview(text) => {
                if self.interaction == AssistantState::Listening {
                    self.preview = text;
                } else {
                    debug!("Preview ignored while {:?}", self.interaction);
                }
            }
            LiveInput::Event(event) => self.apply_event(event),
            LiveInput::Reset => {
                self.preview.clear();
                self.tool_activity.clear();
                self.interaction = AssistantState::Idle;
            }
        }
    }

    fn change_state(&mut self, next: AssistantState) {
        debug!("Assistant state {:?} -> {:?}", self.interaction, next);
        match next {
            AssistantState::Thinking => {
                let preview = self.preview.trim();
                // Preview stays in place until speaking starts
                if !preview.is_empty() && !self.log.last_matches(Role::User, preview) {
                    self.log.append(Turn::user(preview));
                }
            }
            AssistantState::Speaking => self.preview.clear(),
            AssistantState::Idle | AssistantState::Listening => {}
        }
        self.interaction = next;
    }

    fn apply_event(&mut self, event: TransportEvent) {
        match event.kind {
            EventKind::Transcription => {
                if event.content.trim().is_empty() {
                    debug!("Ignoring blank transcription");
                    return;
                }
                if event.is_from_agent() {
                    self.log.append(Turn::assistant(event.content));
                } else {
                    self.log.append(Turn::user(event.content));
                    self.preview.clear();
                }
            }

            EventKind::ToolCall => {
                let Some(tool_name) = event.tool_name else {
                    warn!("Tool call without a tool name dropped");
                    return;
                };
                self.tool_activity.push(ToolActivity {
                    tool_name: tool_name.clone(),
                    description: event.content.clone(),
                    started_at: Utc::now(),
                });
                self.log.append(Turn::tool_call(tool_name, event.content));
            }

            EventKind::ToolResult => {
                let Some(tool_name) = event.tool_name else {
                    warn!("Tool result without a tool name dropped");
                    return;
                };

                let running = self
                    .tool_activity
                    .iter()
                    .filter(|a| a.tool_name == tool_name)
                    .count();
                if running > 1 {
                    warn!(
                        "{} calls of {} in flight, resolving the most recent",
                        running, tool_name
                    );
                }
                if let Some(index) = self
                    .tool_activity
                    .iter()
                    .rposition(|a| a.tool_name == tool_name)
                {
                    self.tool_activity.remove(index);
                }

                if self
                    .log
                    .resolve_tool(&tool_name, ToolStatus::Success, &event.content)
                    .is_none()
                {
                    debug!("No pending call of {} to resolve", tool_name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listening() -> LiveState {
        reduce(LiveState::new(), LiveInput::StateChanged(AssistantState::Listening))
    }

    #[test]
    fn test_preview_promoted_once_on_thinking() {
        let mut state = listening();
        state.apply(LiveInput::Preview("show me all trips".into()));
        state.apply(LiveInput::StateChanged(AssistantState::Thinking));
        state.apply(LiveInput::StateChanged(AssistantState::Thinking));

        assert_eq!(state.log.len(), 1);
        assert_eq!(state.log.turns()[0].role, Role::User);
        assert_eq!(state.log.turns()[0].content, "show me all trips");
        assert_eq!(state.preview, "show me all trips");

        state.apply(LiveInput::StateChanged(AssistantState::Speaking));
        assert!(state.preview.is_empty());
    }

    #[test]
    fn test_blank_preview_not_promoted() {
        let mut state = listening();
        state.apply(LiveInput::Preview("   ".into()));
        state.apply(LiveInput::StateChanged(AssistantState::Thinking));
        assert!(state.log.is_empty());
    }

    #[test]
    fn test_preview_ignored_unless_listening() {
        let mut state = LiveState::new();
        state.apply(LiveInput::Preview("hello".into()));
        assert!(state.preview.is_empty());

        state.apply(LiveInput::StateChanged(AssistantState::Speaking));
        state.apply(LiveInput::Preview("hello".into()));
        assert!(state.preview.is_empty());
    }

    #[test]
    fn test_transcription_roles() {
        let mut state = listening();
        state.apply(LiveInput::Preview("list rou".into()));

        state.apply(LiveInput::Event(TransportEvent::transcription("list routes", None)));
        assert!(state.preview.is_empty());

        state.apply(LiveInput::Event(TransportEvent::transcription(
            "Here are the routes.",
            Some("agent"),
        )));
        state.apply(LiveInput::Event(TransportEvent::transcription("  ", Some("agent"))));

        let roles: Vec<Role> = state.log.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn test_non_agent_speaker_is_user() {
        let mut state = listening();
        state.apply(LiveInput::Preview("list rou".into()));
        state.apply(LiveInput::Event(TransportEvent::transcription(
            "list routes",
            Some("list_routes_tool"),
        )));
        state.apply(LiveInput::Event(TransportEvent::transcription(
            "and stops",
            Some("user"),
        )));

        assert!(state.preview.is_empty());
        let roles: Vec<Role> = state.log.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User]);
    }

    #[test]
    fn test_transcription_content_kept_as_received() {
        let mut state = LiveState::new();
        state.apply(LiveInput::Event(TransportEvent::transcription(
            " Route 7 has 3 buses. ",
            Some("agent"),
        )));
        state.apply(LiveInput::Event(TransportEvent::transcription("thanks\n", None)));

        assert_eq!(state.log.turns()[0].content, " Route 7 has 3 buses. ");
        assert_eq!(state.log.turns()[1].content, "thanks\n");
    }

    #[test]
    fn test_repeated_utterance_after_reply_is_committed_again() {
        let mut state = listening();
        state.apply(LiveInput::Preview("yes".into()));
        state.apply(LiveInput::StateChanged(AssistantState::Thinking));
        state.apply(LiveInput::StateChanged(AssistantState::Speaking));
        state.apply(LiveInput::Event(TransportEvent::transcription(
            "Should I cancel trip 12?",
            Some("agent"),
        )));

        state.apply(LiveInput::StateChanged(AssistantState::Listening));
        state.apply(LiveInput::Preview("yes".into()));
        state.apply(LiveInput::StateChanged(AssistantState::Thinking));

        assert_eq!(state.log.count_role(Role::User), 2);
        let contents: Vec<&str> = state.log.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["yes", "Should I cancel trip 12?", "yes"]);
    }

    #[test]
    fn test_tool_call_and_result() {
        let mut state = LiveState::new();
        state.apply(LiveInput::Event(TransportEvent::tool_call(
            "list_routes_tool",
            "Fetching all active routes...",
        )));
        assert_eq!(state.tool_activity.len(), 1);
        assert_eq!(state.log.turns()[0].tool_status(), Some(ToolStatus::Pending));

        state.apply(LiveInput::Event(TransportEvent::tool_result(
            "list_routes_tool",
            "Found 12 routes",
        )));
        assert!(state.tool_activity.is_empty());
        let turn = &state.log.turns()[0];
        assert_eq!(turn.tool_status(), Some(ToolStatus::Success));
        assert_eq!(turn.content, "Found 12 routes");
    }

    #[test]
    fn test_same_named_tools_resolve_most_recent_first() {
        let mut state = LiveState::new();
        state.apply(LiveInput::Event(TransportEvent::tool_call("get_trip", "trip 1")));
        state.apply(LiveInput::Event(TransportEvent::tool_call("get_trip", "trip 2")));
        state.apply(LiveInput::Event(TransportEvent::tool_result("get_trip", "done")));

        assert_eq!(state.tool_activity.len(), 1);
        assert_eq!(state.tool_activity[0].description, "trip 1");
        assert_eq!(state.log.turns()[0].tool_status(), Some(ToolStatus::Pending));
        assert_eq!(state.log.turns()[1].tool_status(), Some(ToolStatus::Success));
    }

    #[test]
    fn test_unmatched_result_is_harmless() {
        let mut state = LiveState::new();
        state.apply(LiveInput::Event(TransportEvent::tool_result("ghost", "late")));
        assert!(state.log.is_empty());
        assert!(state.tool_activity.is_empty());
    }

    #[test]
    fn test_reset_keeps_log() {
        let mut state = listening();
        state.apply(LiveInput::Preview("assign driver".into()));
        state.apply(LiveInput::Event(TransportEvent::tool_call("assign", "Assigning...")));
        state.apply(LiveInput::Event(TransportEvent::transcription("ok", Some("agent"))));

        let state = reduce(state, LiveInput::Reset);
        assert_eq!(state.interaction, AssistantState::Idle);
        assert!(state.preview.is_empty());
        assert!(state.tool_activity.is_empty());
        assert_eq!(state.log.len(), 2);
    }
}
