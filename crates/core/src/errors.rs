//! Error types for the collaborator contracts.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The backing secret store rejected a read or write.
    #[error("Secret store error: {0}")]
    SecretStore(String),
}

impl Error {
    pub fn secret_store(message: impl Into<String>) -> Self {
        Self::SecretStore(message.into())
    }
}
