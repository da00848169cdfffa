/// Convenience result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for opening, decoding and driving an animation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid caller input, e.g. a stream that cannot seek. Raised before
    /// any decode thread exists.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Malformed or truncated GIF header / frame table at open time.
    #[error("format error: {0}")]
    Format(String),

    /// I/O or bitstream failure while decoding a frame on the worker.
    #[error("decode error: {0}")]
    Decode(String),

    /// Playback configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// The decode thread could not be spawned.
    #[error("thread error: {0}")]
    Thread(String),
}

impl Error {
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
