//! Error type shared by every module of the trainer core.
//!
//! Silence, a trial with nothing played and a cancelled trial are not
//! errors; they show up as `None` readings and `TrialOutcome` variants.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No input device available")]
    NoInputDevice,

    #[error("No suitable f32 input format found for {0}")]
    UnsupportedConfig(String),

    #[error("Audio: {0}")]
    Audio(String),

    #[error("Trial target not in note table: {0}")]
    UnknownTarget(String),

    #[error("Score store: {0}")]
    Store(String),

    #[error("Worker thread: {0}")]
    Worker(String),

    #[error("Invalid settings: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn audio(err: impl std::fmt::Display) -> Self {
        Error::Audio(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
