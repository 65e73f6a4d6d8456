use phonepilot_protocol::ConversationMessage;
use phonepilot_protocol::ExecutionStep;
use phonepilot_protocol::StepKind;
use phonepilot_protocol::TaskEvent;
use phonepilot_protocol::TaskVariant;
use phonepilot_protocol::ThinkingChunkEvent;
use tracing::debug;
use uuid::Uuid;

/// Shown when an abort record carries no message of its own.
pub const DEFAULT_ABORT_MESSAGE: &str = "Task stopped";

/// The conversation for one device panel, folded from stream records.
///
/// `apply` is a deterministic fold: the same record sequence always produces
/// the same state, whether records arrive one at a time or in a batch. After
/// a terminal record flips a message out of streaming, any further record for
/// that message is dropped.
#[derive(Debug, Clone)]
pub struct Conversation {
    device_id: String,
    variant: TaskVariant,
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new(device_id: impl Into<String>, variant: TaskVariant) -> Self {
        Self {
            device_id: device_id.into(),
            variant,
            messages: Vec::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn variant(&self) -> TaskVariant {
        self.variant
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Appends the user message and its paired streaming assistant message;
    /// returns the assistant message id the new stream writes into.
    pub fn begin_turn(&mut self, text: String) -> Uuid {
        self.messages.push(ConversationMessage::user(text));
        let assistant = ConversationMessage::assistant_streaming();
        let id = assistant.id;
        self.messages.push(assistant);
        id
    }

    pub fn message(&self, id: Uuid) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Folds one record into the message identified by `target`.
    ///
    /// Returns the step created by the record, if any, and whether the record
    /// was applied at all. Records addressed to a finished message are
    /// dropped (late or duplicate delivery after a terminal record).
    pub fn apply(&mut self, target: Uuid, event: &TaskEvent) -> Applied {
        let variant = self.variant;
        let Some(message) = self.messages.iter_mut().find(|m| m.id == target) else {
            debug!("dropping record for unknown message {target}");
            return Applied::Dropped;
        };
        if !message.is_streaming {
            debug!("dropping record delivered after terminal state for {target}");
            return Applied::Dropped;
        }
        match event {
            TaskEvent::ThinkingChunk(chunk) => {
                message.pending_thinking.push_str(&chunk.text);
                Applied::Updated
            }
            TaskEvent::Step(step) => {
                // The record's own thinking text wins when present; otherwise
                // the fragments accumulated since the previous step.
                let thinking = if step.thinking.is_empty() {
                    std::mem::take(&mut message.pending_thinking)
                } else {
                    message.pending_thinking.clear();
                    step.thinking.clone()
                };
                message.thinking_blocks.push(thinking.clone());
                message.actions.push(step.action.clone());
                message.step_count = step.step;
                let trace_step = ExecutionStep {
                    id: Uuid::new_v4(),
                    kind: StepKind::Thinking,
                    summary: thinking,
                    tool_name: None,
                    args: None,
                    result: None,
                    created_at: chrono::Utc::now(),
                    expanded: true,
                };
                message.steps.push(trace_step.clone());
                Applied::Step(trace_step)
            }
            TaskEvent::ToolCall(call) => {
                if variant == TaskVariant::Direct {
                    debug!("tool_call record on the direct variant; applying anyway");
                }
                let step = ExecutionStep::tool_call(
                    tool_call_summary(&call.name),
                    call.name.clone(),
                    call.args.clone(),
                );
                message.steps.push(step.clone());
                Applied::Step(step)
            }
            TaskEvent::ToolResult(result) => {
                let step = ExecutionStep::tool_result(
                    tool_result_summary(&result.name),
                    result.name.clone(),
                    result.result.clone(),
                );
                message.steps.push(step.clone());
                Applied::Step(step)
            }
            TaskEvent::Message(interim) => {
                message.content = interim.content.clone();
                Applied::Updated
            }
            TaskEvent::Done(done) => {
                message.content = done.message.clone();
                message.step_count = done.steps;
                message.success = Some(done.success);
                message.is_streaming = false;
                Applied::Terminal
            }
            TaskEvent::Error(error) => {
                message.content = format!("Error: {}", error.message);
                message.success = Some(false);
                message.is_streaming = false;
                Applied::Terminal
            }
            TaskEvent::Aborted(aborted) => {
                message.content = aborted
                    .message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ABORT_MESSAGE.to_string());
                message.success = Some(false);
                message.is_streaming = false;
                Applied::Terminal
            }
        }
    }

    /// Convenience used by the session pump when the coalescer flushes a
    /// batch of fragments.
    pub fn apply_thinking(&mut self, target: Uuid, text: String) -> Applied {
        self.apply(target, &TaskEvent::ThinkingChunk(ThinkingChunkEvent { text }))
    }
}

/// Result of folding one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Record mutated the message without creating a step or finishing it.
    Updated,
    /// Record created an execution step.
    Step(ExecutionStep),
    /// Record was terminal; the message stopped streaming.
    Terminal,
    /// Record was dropped by the idempotence guard.
    Dropped,
}

fn tool_call_summary(name: &str) -> String {
    match name {
        "chat" => "Replying to the user".to_string(),
        "phone_action" => "Driving the device".to_string(),
        "screenshot" => "Capturing the screen".to_string(),
        other => format!("invoked tool {other}"),
    }
}

fn tool_result_summary(name: &str) -> String {
    match name {
        "chat" => "Reply delivered".to_string(),
        "phone_action" => "Device action finished".to_string(),
        "screenshot" => "Screen captured".to_string(),
        other => format!("result from {other}"),
    }
}
