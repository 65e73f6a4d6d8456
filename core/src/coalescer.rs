use std::time::Duration;

use tokio::time::Instant;

/// Default width of the leading debounce window.
pub const DEFAULT_FLUSH_WINDOW: Duration = Duration::from_millis(50);

/// Batches token-granularity thinking fragments into bounded-rate updates.
///
/// The first fragment of a burst arms a flush deadline; fragments arriving
/// before it fires join the buffer without re-arming. The owner flushes by
/// calling [`ThinkingCoalescer::take`], either when the deadline fires or
/// synchronously ahead of any record that closes the thinking phase, so a
/// finalized block is never missing trailing characters. Nothing is ever
/// dropped: `take` always returns the full concatenation.
#[derive(Debug)]
pub struct ThinkingCoalescer {
    window: Duration,
    buffer: String,
    deadline: Option<Instant>,
}

impl Default for ThinkingCoalescer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_WINDOW)
    }
}

impl ThinkingCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buffer: String::new(),
            deadline: None,
        }
    }

    /// Buffer one fragment. Returns the newly-armed deadline when this
    /// fragment starts a burst; `None` while a flush is already scheduled.
    pub fn push(&mut self, fragment: &str) -> Option<Instant> {
        self.buffer.push_str(fragment);
        if self.deadline.is_none() {
            let deadline = Instant::now() + self.window;
            self.deadline = Some(deadline);
            Some(deadline)
        } else {
            None
        }
    }

    /// The pending flush deadline, if a burst is buffered.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drain everything buffered and disarm the deadline.
    pub fn take(&mut self) -> Option<String> {
        self.deadline = None;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Drop buffered fragments without applying them (teardown only).
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.deadline = None;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
