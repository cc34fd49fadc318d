use thiserror::Error;

/// Typed failures of the control panel domain.
///
/// Application seams (CLI, terminal setup, config loading) wrap these in
/// `anyhow::Error` with context; the panel itself matches on them.
#[derive(Debug, Error)]
pub enum PanelError {
    /// A required form field was blank. Never reaches the server.
    #[error("{0}")]
    Validation(String),

    /// The server reported a failure through an `error` event.
    #[error("server error: {0}")]
    Server(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// The panel was disposed and its channel is closed.
    #[error("control panel has been disposed")]
    Disposed,
}

impl From<serde_json::Error> for PanelError {
    fn from(e: serde_json::Error) -> Self {
        PanelError::Protocol(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PanelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        PanelError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;
