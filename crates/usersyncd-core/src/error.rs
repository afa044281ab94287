//! Error types for usersyncd

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The initial listing or the subscribe call failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The open event stream failed while being drained.
    #[error("stream error: {0}")]
    Stream(String),

    /// A single add/remove or per-event re-fetch failed.
    #[error("{op} failed for {name}: {message}")]
    Operation {
        op: &'static str,
        name: String,
        message: String,
    },

    /// A malformed event payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `connect()`/`run()` called out of sequence or concurrently.
    #[error("misuse: {0}")]
    Misuse(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn connection(message: impl std::fmt::Display) -> Self {
        Self::Connection(message.to_string())
    }

    pub fn stream(message: impl std::fmt::Display) -> Self {
        Self::Stream(message.to_string())
    }

    pub fn operation(
        op: &'static str,
        name: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Operation {
            op,
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Caller defects and bad configuration are not worth retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Misuse(_) | Self::Config(_))
    }
}
