use serde::Deserialize;
use serde::Serialize;

/// User-selectable display preference for a device panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Pick video when the platform supports it, fall back to screenshots.
    #[default]
    Auto,
    Video,
    Screenshot,
}

/// The resolved rendering transport for a device at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Video,
    Screenshot,
}

/// Result of probing the platform for video-stream support.
///
/// Probed once per process; the two unavailable variants are distinguished so
/// the console can word its advisory accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCapability {
    Available,
    UnsupportedPlatform,
    InsecureContext,
}

impl VideoCapability {
    pub fn is_available(self) -> bool {
        self == VideoCapability::Available
    }
}
