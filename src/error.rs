use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("noise floor must be a finite, non-negative number of seconds, got {0}")]
    InvalidNoiseFloor(f64),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}
