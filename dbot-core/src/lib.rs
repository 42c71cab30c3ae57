//! # dbot-core
//!
//! Core types and capabilities shared by the bot crates: inbound [`Update`]s, the outbound
//! [`Api`] capability (`call(method, params) -> JSON`), [`OutgoingMessage`] variants and the
//! [`MessageSender`] that applies parse mode and the suppressible-error registry, the error
//! taxonomy, and tracing initialization. Transport-agnostic; used by handler-chain and dbot-telegram.

pub mod bot;
pub mod error;
pub mod logger;
pub mod message;
pub mod types;

pub use bot::{Api, ApiResponse, CallbackAnswer, FileUpload, InlineAnswer, MessageSender};
pub use dbot_callback::{ActionRef, CallbackArg, CodecError};
pub use error::{DbotError, ErrorKind, HandlerError, RegistryError, Result};
pub use logger::init_tracing;
pub use message::{
    MediaKind, MediaMessage, OutgoingMessage, ParseMode, TextMessage, ATTACH_PART,
};
pub use types::{Chat, Update, UpdateKind, User, UserId};
