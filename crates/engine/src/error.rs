//! Errors for the dialog engine and its task/session bookkeeping.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] callbridge_backend::BackendError),

    #[error(transparent)]
    Media(#[from] callbridge_media::MediaError),

    #[error(transparent)]
    Vad(#[from] callbridge_vad::VadError),

    #[error("background task was aborted or panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("no such session: {0}")]
    NoSuchSession(String),

    #[error("call not confirmed yet")]
    CallNotConfirmed,
}

impl From<EngineError> for callbridge_core::Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Backend(callbridge_backend::BackendError::PermissionDenied) => {
                callbridge_core::Error::PermissionDenied
            }
            EngineError::NoSuchSession(id) => callbridge_core::Error::NoSuchSession(id),
            EngineError::CallNotConfirmed => callbridge_core::Error::CallNotConfirmed,
            other => callbridge_core::Error::Backend(other.to_string()),
        }
    }
}
