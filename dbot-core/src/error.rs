use std::time::Duration;

use dbot_callback::CodecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbotError {
    /// Transport-level failure from the outbound `call` capability.
    #[error("Api error: {0}")]
    Api(String),

    /// The platform rejected message markup. Suppressible via [`crate::MessageSender::suppress`].
    #[error("Text parse error: {0}")]
    TextParse(String),

    #[error("Unsupported update: {0}")]
    UnsupportedUpdate(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Callback error: {0}")]
    Callback(#[from] CodecError),

    #[error("State error: {0}")]
    State(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A local file to upload does not exist. Suppressible via [`crate::MessageSender::suppress`].
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chain resolution exceeded {0} steps")]
    ChainTooDeep(usize),

    #[error("Update processing timed out after {0:?}")]
    Timeout(Duration),
}

impl DbotError {
    /// The suppressible kind of this error, if it has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DbotError::TextParse(_) => Some(ErrorKind::TextParse),
            DbotError::FileNotFound(_) => Some(ErrorKind::FileNotFound),
            _ => None,
        }
    }
}

/// Error kinds a bot writer may opt out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TextParse,
    FileNotFound,
}

/// Registration-time failures. Raised to the bot writer before any update is served.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Action {0:?} is already registered")]
    Duplicate(String),

    #[error("Actions must have a name")]
    Anonymous,

    #[error("Invalid action name {0:?}: names travel in space-separated tokens")]
    InvalidName(String),

    #[error("Action {0:?} is not registered")]
    UnknownAction(String),

    #[error("Invalid trigger {0:?}")]
    InvalidTrigger(String),
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("No text in update")]
    NoText,

    #[error("Update has no chat")]
    NoChat,

    #[error("Only available while handling a callback action")]
    NotInCallback,

    #[error("Not available while handling a callback action")]
    InCallback,

    #[error("Update has no message id")]
    NoMessage,

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("State error: {0}")]
    State(String),
}

pub type Result<T> = std::result::Result<T, DbotError>;
