use phonepilot_backend_client::ClientError;

pub type Result<T> = std::result::Result<T, PilotErr>;

#[derive(Debug, thiserror::Error)]
pub enum PilotErr {
    /// The transport ended or failed before delivering a terminal record.
    #[error("stream ended unexpectedly: {0}")]
    Stream(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    /// The still-image endpoint answered but reported a failed capture.
    #[error("screenshot capture failed: {0}")]
    Screenshot(String),

    #[error("invalid base64 in frame payload: {0}")]
    FrameEncoding(#[from] base64::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(String),
}
