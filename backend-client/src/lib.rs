//! Typed HTTP client for the phone-agent backend.
//!
//! The backend exposes a chunked task-stream endpoint per execution variant,
//! a companion cancellation call, a still-image endpoint used by the
//! screenshot poller, and passthrough routes for user input (tap/swipe/...).
//! This crate only speaks the boundary; decoding the stream into records is
//! the core crate's job.

mod client;
mod error;
mod types;

pub use client::Client;
pub use client::TaskStream;
pub use error::ByteStream;
pub use error::ClientError;
pub use types::ScreenshotResponse;
pub use types::SwipeRequest;
pub use types::TaskRequest;
