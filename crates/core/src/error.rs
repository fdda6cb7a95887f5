//! Shared error type for the dialog engine and its collaborators.

/// Errors that cross crate boundaries inside the bridge.
///
/// Network/backend failures are not fatal to a call; see the propagation
/// policy in the dialog engine, which catches these at the per-call
/// boundary and falls back to `WAIT_FOR_USER`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("backend denied the request (403)")]
    PermissionDenied,

    #[error("inference error: {0}")]
    Inference(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("no such session: {0}")]
    NoSuchSession(String),

    #[error("call not confirmed yet")]
    CallNotConfirmed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fatal setup error: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
