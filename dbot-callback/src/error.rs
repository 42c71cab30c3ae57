use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Action name is empty")]
    EmptyAction,

    #[error("Action name contains whitespace: {0:?}")]
    InvalidAction(String),

    /// Arguments are space-separated on the wire; a space inside one is a hard limit, never escaped.
    #[error("Callback argument contains a space: {0:?}")]
    ArgContainsSpace(String),

    #[error("Callback token is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("Malformed callback token: {0:?}")]
    Malformed(String),

    #[error("Callback signature mismatch")]
    BadSignature,
}
