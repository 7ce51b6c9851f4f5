use thiserror::Error;

/// Failure of a wiki use case.
///
/// Validation and not-found conditions are reported before anything is
/// mutated. Media cleanup failures never surface here; they are reported
/// in the update outcome instead.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl WikiError {
    pub fn validation(message: impl Into<String>) -> Self {
        WikiError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        WikiError::NotFound(message.into())
    }
}

impl From<anyhow::Error> for WikiError {
    fn from(err: anyhow::Error) -> Self {
        WikiError::Storage(err)
    }
}

pub type WikiResult<T> = std::result::Result<T, WikiError>;
