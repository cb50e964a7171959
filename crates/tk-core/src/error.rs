use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The secure random source could not produce bytes for a signature.
    #[error("Entropy source error: {0}")]
    Entropy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn entropy(message: impl Into<String>) -> Self {
        Self::Entropy(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Entropy failures leave the extractor mid-stream and cannot be retried locally.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Entropy(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<getrandom::Error> for Error {
    fn from(err: getrandom::Error) -> Self {
        Error::Entropy(err.to_string())
    }
}
