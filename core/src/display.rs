use phonepilot_protocol::DisplayMode;
use phonepilot_protocol::Transport;
use phonepilot_protocol::VideoCapability;
use tracing::info;
use tracing::warn;

/// Checks the preconditions for the video transport.
///
/// Mirrors the browser-side probe: no configured decoder endpoint means the
/// platform cannot render video at all, and a plain-HTTP endpoint on a
/// non-local host fails the secure-context requirement. Callers are expected
/// to probe once per process and hand the result to [`DisplayController`].
pub fn probe_video_capability(video_stream_url: Option<&str>) -> VideoCapability {
    let Some(url) = video_stream_url else {
        return VideoCapability::UnsupportedPlatform;
    };
    if url.starts_with("https://")
        || url.starts_with("http://localhost")
        || url.starts_with("http://127.0.0.1")
    {
        VideoCapability::Available
    } else {
        VideoCapability::InsecureContext
    }
}

/// Per-device arbitration between the video transport and polled screenshots.
///
/// `video_failed` is sticky: once the video subsystem reports an
/// unrecoverable failure, every evaluation resolves to screenshots until a
/// different device is selected. Re-selecting `Auto` does not clear it, and
/// there is no cooldown-based recovery.
#[derive(Debug, Clone)]
pub struct DisplayController {
    device_id: String,
    mode: DisplayMode,
    capability: VideoCapability,
    video_failed: bool,
    advisory_dismissed: bool,
}

impl DisplayController {
    pub fn new(device_id: impl Into<String>, capability: VideoCapability) -> Self {
        Self {
            device_id: device_id.into(),
            mode: DisplayMode::Auto,
            capability,
            video_failed: false,
            advisory_dismissed: false,
        }
    }

    pub fn with_mode(mut self, mode: DisplayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Explicit user selection; overrides automatic arbitration until the
    /// user returns to `Auto`.
    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    pub fn video_failed(&self) -> bool {
        self.video_failed
    }

    /// Callback for the video transport once it has given up retrying.
    pub fn report_video_failure(&mut self) {
        if !self.video_failed {
            warn!(
                device = %self.device_id,
                "video transport failed; falling back to screenshot polling"
            );
            self.video_failed = true;
        }
    }

    /// Switch the panel to another device. This is the only transition that
    /// clears `video_failed`.
    pub fn select_device(&mut self, device_id: impl Into<String>) {
        let device_id = device_id.into();
        if device_id != self.device_id {
            info!(from = %self.device_id, to = %device_id, "device changed; video state reset");
            self.device_id = device_id;
            self.video_failed = false;
        }
    }

    /// The resolved transport for the current state.
    pub fn effective_transport(&self) -> Transport {
        match self.mode {
            DisplayMode::Video => Transport::Video,
            DisplayMode::Screenshot => Transport::Screenshot,
            DisplayMode::Auto => {
                if self.capability.is_available() && !self.video_failed {
                    Transport::Video
                } else {
                    Transport::Screenshot
                }
            }
        }
    }

    /// Whether the one-time capability advisory should be shown. Tracks its
    /// own dismissal flag; independent of `video_failed` stickiness.
    pub fn should_show_advisory(&self) -> bool {
        if self.advisory_dismissed {
            return false;
        }
        self.video_failed || (self.mode == DisplayMode::Auto && !self.capability.is_available())
    }

    pub fn dismiss_advisory(&mut self) {
        self.advisory_dismissed = true;
    }
}
