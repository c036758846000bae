use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConvoError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bad response: {status}. {message}")]
    BadResponse { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Conversation not found: {0}")]
    NotFound(Uuid),

    #[error("Index {index} is out of range for history of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No storage configured")]
    NoStorage,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConvoError {
    pub fn bad_response(status: u16, message: impl Into<String>) -> Self {
        Self::BadResponse {
            status,
            message: message.into(),
        }
    }

    /// True when the exchange with the server broke down (unreachable, timed out,
    /// connection dropped mid-body), as opposed to the server answering badly.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, ConvoError>;
