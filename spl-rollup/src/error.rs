use thiserror::Error;

#[derive(Error, Debug)]
pub enum RollupError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

impl RollupError {
    pub fn validation(message: impl Into<String>) -> Self {
        RollupError::Validation(message.into())
    }

    /// Whether the caller supplied bad input, as opposed to an internal failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, RollupError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, RollupError>;
