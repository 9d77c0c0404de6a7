/// Result alias that carries the custom [`StreamerError`] type.
pub type Result<T> = std::result::Result<T, StreamerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    /// Malformed channel table, motion library or settings file. Raised at
    /// load time; nothing streams afterwards.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A single message could not be handed to the transport.
    #[error("transport error: {0}")]
    Transport(String),
    /// The requested operation is not valid in the streamer's current state.
    #[error("invalid state: {0}")]
    State(String),
    #[error("unknown mode `{0}`")]
    UnknownMode(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl StreamerError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn transport<T: Into<String>>(msg: T) -> Self {
        Self::Transport(msg.into())
    }

    pub fn state<T: Into<String>>(msg: T) -> Self {
        Self::State(msg.into())
    }
}
