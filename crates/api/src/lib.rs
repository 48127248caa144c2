//! Bot API wire model for courier.
//!
//! Only the subset of objects and methods the dispatch core needs is typed
//! here; everything else travels as raw JSON through `Client::send_raw`.

pub mod error;
pub mod input_file;
pub mod methods;
pub mod response;
pub mod scope;
pub mod types;
pub mod update;

pub use {
    error::{ApiError, UpdateError},
    input_file::InputFile,
    methods::Method,
    response::{ApiResponse, ResponseParameters},
    scope::{BotCommandScope, ChatTarget, ScopeKey},
    types::{
        BotCommand, CallbackQuery, Chat, ChatKind, CommandToken, InlineQuery, Message,
        MessageEntity, ParseMode, ReplyParameters, User, WebhookInfo,
    },
    update::{RawUpdate, Update, UpdateKind, UpdateType},
};

/// Default public Bot API host.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
