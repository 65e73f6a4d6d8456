//! Core state machines for the phone-agent console: the stream-to-trace
//! pipeline (envelope parser, thinking coalescer, conversation reducer,
//! session controller) and the device-display subsystem (mode arbitration,
//! screenshot polling).

mod coalescer;
mod config;
mod conversation;
mod display;
mod envelope;
mod error;
mod poller;
mod session;

pub use coalescer::DEFAULT_FLUSH_WINDOW;
pub use coalescer::ThinkingCoalescer;
pub use config::BACKEND_URL_ENV_VAR;
pub use config::CONFIG_DIR_ENV_VAR;
pub use config::Config;
pub use conversation::Applied;
pub use conversation::Conversation;
pub use conversation::DEFAULT_ABORT_MESSAGE;
pub use display::DisplayController;
pub use display::probe_video_capability;
pub use envelope::EnvelopeParser;
pub use error::PilotErr;
pub use error::Result;
pub use poller::DEFAULT_POLL_INTERVAL;
pub use poller::Frame;
pub use poller::FrameSource;
pub use poller::ScreenshotPoller;
pub use session::STREAM_ENDED_EARLY;
pub use session::SessionController;
pub use session::SessionUpdate;
