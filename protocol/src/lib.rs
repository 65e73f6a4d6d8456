//! Wire-level event records and the conversation/trace data model shared
//! between the streaming client, the display subsystem and the console UI.

mod display;
mod events;
mod trace;

pub use display::DisplayMode;
pub use display::Transport;
pub use display::VideoCapability;
pub use events::AbortedEvent;
pub use events::DoneEvent;
pub use events::ErrorEvent;
pub use events::MessageEvent;
pub use events::StepEvent;
pub use events::TaskEvent;
pub use events::TaskVariant;
pub use events::ThinkingChunkEvent;
pub use events::ToolCallEvent;
pub use events::ToolResultEvent;
pub use trace::ConversationMessage;
pub use trace::ExecutionStep;
pub use trace::Role;
pub use trace::StepKind;
pub use trace::TaskOutcome;
