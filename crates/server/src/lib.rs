//! Operator REST surface (spec §6), health/metrics endpoints, and the
//! live-call registry the process-main entry point drains on shutdown.

pub mod call_events;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod state;

pub use call_events::CallEventHandler;
pub use http::create_router;
pub use metrics::init_metrics;
pub use registry::CallRegistry;
pub use state::{ensure_vad_model, AppState};

use thiserror::Error;

/// Server-layer errors not already covered by `callbridge_core::Error`.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("no such session: {0}")]
    NoSuchSession(String),
    #[error("call not confirmed yet")]
    CallNotConfirmed,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::NoSuchSession(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::CallNotConfirmed => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
