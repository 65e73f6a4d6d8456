use serde::Deserialize;
use serde::Serialize;

/// Body for both task-stream endpoints and the cancellation call.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRequest {
    pub device_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeviceRef {
    pub device_id: String,
}

/// Response of the still-image endpoint.
///
/// `base64_data` holds the encoded frame; `is_sensitive` marks screens the
/// device reports as secure (payment, password entry) so the console can
/// blank them.
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotResponse {
    pub success: bool,
    #[serde(default)]
    pub base64_data: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub is_sensitive: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TapRequest {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwipeRequest {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TypeTextRequest {
    pub text: String,
}
