//! # dbot-callback
//!
//! Callback tokens for interactive buttons: [`CallbackCodec`] turns an action name plus positional
//! arguments into a short wire string (optionally prefixed by a truncated signature) and back,
//! [`CallbackArg`] coerces decoded arguments, [`InlineKeyboard`] builds `reply_markup` from tokens.
//! No dependency on the rest of the workspace.

mod action;
mod args;
mod codec;
mod error;
mod keyboard;

pub use action::ActionRef;
pub use args::CallbackArg;
pub use codec::{
    CallbackCodec, CallbackVerifier, CodecConfig, DecodedCallback, DEFAULT_MAX_LEN,
    DEFAULT_SIGN_LENGTH,
};
pub use error::CodecError;
pub use keyboard::{Button, InlineKeyboard, BLANK_CALLBACK};
