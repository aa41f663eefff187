use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
}
