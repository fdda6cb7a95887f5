//! Errors for the backend session client and the STT/TTS HTTP adapters.

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend denied the request (403)")]
    PermissionDenied,

    #[error("backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid json response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
}

impl From<BackendError> for callbridge_core::Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied => callbridge_core::Error::PermissionDenied,
            other => callbridge_core::Error::Backend(other.to_string()),
        }
    }
}
