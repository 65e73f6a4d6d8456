use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ToolCall,
    ToolResult,
    Thinking,
}

/// One entry in an assistant message's execution trace.
///
/// Immutable once created, except for `expanded` which is presentation state
/// toggled by the console.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionStep {
    pub id: Uuid,
    pub kind: StepKind,
    /// Human-readable one-line summary shown in the trace view.
    pub summary: String,
    pub tool_name: Option<String>,
    pub args: Option<Value>,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub expanded: bool,
}

impl ExecutionStep {
    pub fn tool_call(summary: String, name: String, args: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: StepKind::ToolCall,
            summary,
            tool_name: Some(name),
            args: Some(args),
            result: None,
            created_at: Utc::now(),
            expanded: true,
        }
    }

    pub fn tool_result(summary: String, name: String, result: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: StepKind::ToolResult,
            summary,
            tool_name: Some(name),
            args: None,
            result: Some(result),
            created_at: Utc::now(),
            expanded: true,
        }
    }
}

/// One turn of the conversation.
///
/// Assistant messages are created alongside the user message that prompted
/// them, with `is_streaming == true` and everything else empty. Exactly one
/// terminal record flips `is_streaming` to false and sets `success`; no
/// record may mutate the message after that.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub steps: Vec<ExecutionStep>,
    pub is_streaming: bool,
    /// Unset while streaming; set exactly once by the terminal record.
    pub success: Option<bool>,
    /// Finalized thinking text, one block per completed step (direct variant).
    pub thinking_blocks: Vec<String>,
    /// Action payloads in step order (direct variant).
    pub actions: Vec<Value>,
    /// Thinking text accumulated since the last completed step. Distinct from
    /// `thinking_blocks`: it is still growing and not yet attributable to a
    /// step.
    pub pending_thinking: String,
    pub step_count: u32,
}

impl ConversationMessage {
    pub fn user(content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content,
            timestamp: Utc::now(),
            steps: Vec::new(),
            is_streaming: false,
            success: None,
            thinking_blocks: Vec::new(),
            actions: Vec::new(),
            pending_thinking: String::new(),
            step_count: 0,
        }
    }

    /// The empty assistant message a new stream writes into.
    pub fn assistant_streaming() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            steps: Vec::new(),
            is_streaming: true,
            success: None,
            thinking_blocks: Vec::new(),
            actions: Vec::new(),
            pending_thinking: String::new(),
            step_count: 0,
        }
    }
}

/// Terminal result of one streamed task, as surfaced to observers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed {
        message: String,
        success: bool,
        steps: u32,
    },
    Failed {
        message: String,
    },
    Aborted {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn assistant_placeholder_starts_streaming_and_empty() {
        let message = ConversationMessage::assistant_streaming();
        assert_eq!(message.role, Role::Assistant);
        assert!(message.is_streaming);
        assert_eq!(message.success, None);
        assert!(message.content.is_empty());
        assert!(message.steps.is_empty());
        assert!(message.pending_thinking.is_empty());
    }

    #[test]
    fn user_message_is_not_streaming() {
        let message = ConversationMessage::user("open settings".into());
        assert_eq!(message.role, Role::User);
        assert!(!message.is_streaming);
        assert_eq!(message.content, "open settings");
    }
}
