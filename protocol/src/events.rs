use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Which of the two backend execution paths a task runs on.
///
/// The variants share the wire framing and the terminal-record contract but
/// emit different record kinds: `Direct` streams `thinking_chunk`/`step`
/// records from a single model, `Orchestrated` streams `tool_call`/
/// `tool_result`/`message` records from the tool-driven planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskVariant {
    #[default]
    Direct,
    Orchestrated,
}

/// One decoded record from the task stream.
///
/// The agent backend emits these as newline-delimited `data: <JSON>` records
/// over a chunked response body. Exactly one terminal record (`done`, `error`
/// or `aborted`) closes a stream; anything delivered after it is dropped by
/// the reducer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Incremental fragment of the model's thinking text.
    ThinkingChunk(ThinkingChunkEvent),

    /// A completed reasoning/action step from the direct single-model run.
    Step(StepEvent),

    /// Orchestrator invoked a tool.
    ToolCall(ToolCallEvent),

    /// Result payload for a previously issued tool call.
    ToolResult(ToolResultEvent),

    /// Interim assistant text; replaces the message content without closing
    /// the stream.
    Message(MessageEvent),

    /// Terminal: the task ran to completion.
    Done(DoneEvent),

    /// Terminal: the backend reported a failure.
    Error(ErrorEvent),

    /// Terminal: the task was cancelled by the user or client.
    Aborted(AbortedEvent),
}

impl TaskEvent {
    /// True for the three record kinds that close a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::Done(_) | TaskEvent::Error(_) | TaskEvent::Aborted(_)
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ThinkingChunkEvent {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StepEvent {
    /// Full thinking text for this step. May be empty, in which case the
    /// accumulated `thinking_chunk` buffer is used instead.
    #[serde(default)]
    pub thinking: String,
    /// Opaque action payload (tap/swipe/launch/... as emitted by the model).
    pub action: Value,
    /// 1-based index of this step within the task.
    pub step: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ToolCallEvent {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ToolResultEvent {
    pub name: String,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MessageEvent {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DoneEvent {
    #[serde(default)]
    pub message: String,
    pub success: bool,
    #[serde(default)]
    pub steps: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ErrorEvent {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AbortedEvent {
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserializes_thinking_chunk() {
        let event: TaskEvent =
            serde_json::from_str(r#"{"type":"thinking_chunk","text":"He"}"#).unwrap();
        assert_eq!(
            event,
            TaskEvent::ThinkingChunk(ThinkingChunkEvent { text: "He".into() })
        );
        assert!(!event.is_terminal());
    }

    #[test]
    fn deserializes_step_with_defaulted_thinking() {
        let event: TaskEvent =
            serde_json::from_str(r#"{"type":"step","action":{"a":1},"step":3}"#).unwrap();
        assert_eq!(
            event,
            TaskEvent::Step(StepEvent {
                thinking: String::new(),
                action: json!({"a": 1}),
                step: 3,
            })
        );
    }

    #[test]
    fn deserializes_terminal_records() {
        let done: TaskEvent =
            serde_json::from_str(r#"{"type":"done","message":"ok","success":true,"steps":4}"#)
                .unwrap();
        let error: TaskEvent = serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        let aborted: TaskEvent = serde_json::from_str(r#"{"type":"aborted"}"#).unwrap();
        assert!(done.is_terminal());
        assert!(error.is_terminal());
        assert!(aborted.is_terminal());
        assert_eq!(aborted, TaskEvent::Aborted(AbortedEvent { message: None }));
    }

    #[test]
    fn rejects_unknown_record_kind() {
        let result = serde_json::from_str::<TaskEvent>(r#"{"type":"heartbeat"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn round_trips_tool_call() {
        let event = TaskEvent::ToolCall(ToolCallEvent {
            name: "chat".into(),
            args: json!({"message": "go"}),
        });
        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: TaskEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }
}
