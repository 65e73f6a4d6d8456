use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::StatusCode;

pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}
