//! Configuration errors.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("config source error: {0}")]
    Source(#[from] config::ConfigError),
}
