#[derive(Debug, thiserror::Error)]
pub enum VadError {
    #[error("model error: {0}")]
    Model(String),
    #[error("tensor shape error: {0}")]
    Tensor(String),
}
