use serde::{Serialize, de::DeserializeOwned};

use crate::{
    input_file::InputFile,
    scope::{BotCommandScope, ChatTarget, ScopeKey},
    types::{BotCommand, Message, ParseMode, ReplyParameters, User, WebhookInfo},
    update::{RawUpdate, UpdateType},
};

/// A Bot API method: its wire name, its JSON body and its result type.
pub trait Method: Serialize + Send + Sync {
    type Output: DeserializeOwned + Send;

    const NAME: &'static str;

    /// File arguments by field name. When any of them is an upload the
    /// request goes out as multipart form data.
    fn input_files(&self) -> Vec<(&'static str, &InputFile)> {
        Vec::new()
    }

    fn has_uploads(&self) -> bool {
        self.input_files().iter().any(|(_, file)| file.is_upload())
    }
}

macro_rules! method {
    ($ty:ty, $name:literal, $output:ty) => {
        impl Method for $ty {
            type Output = $output;

            const NAME: &'static str = $name;
        }
    };
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetMe {}

method!(GetMe, "getMe", User);

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Long-poll timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<UpdateType>>,
}

/// Updates come back unclassified so one unknown kind cannot fail the batch.
method!(GetUpdates, "getUpdates", Vec<RawUpdate>);

#[derive(Debug, Clone, Default, Serialize)]
pub struct SetWebhook {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<InputFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<UpdateType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_pending_updates: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<String>,
}

impl Method for SetWebhook {
    type Output = bool;

    const NAME: &'static str = "setWebhook";

    fn input_files(&self) -> Vec<(&'static str, &InputFile)> {
        self.certificate
            .as_ref()
            .map(|file| ("certificate", file))
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteWebhook {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_pending_updates: Option<bool>,
}

method!(DeleteWebhook, "deleteWebhook", bool);

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetWebhookInfo {}

method!(GetWebhookInfo, "getWebhookInfo", WebhookInfo);

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetMyCommands {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<BotCommandScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl GetMyCommands {
    #[must_use]
    pub fn for_scope(key: &ScopeKey) -> Self {
        Self {
            scope: Some(key.scope.clone()),
            language_code: key.language_code.clone(),
        }
    }
}

method!(GetMyCommands, "getMyCommands", Vec<BotCommand>);

#[derive(Debug, Clone, Default, Serialize)]
pub struct SetMyCommands {
    pub commands: Vec<BotCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<BotCommandScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl SetMyCommands {
    #[must_use]
    pub fn for_scope(key: &ScopeKey, commands: Vec<BotCommand>) -> Self {
        Self {
            commands,
            scope: Some(key.scope.clone()),
            language_code: key.language_code.clone(),
        }
    }
}

method!(SetMyCommands, "setMyCommands", bool);

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteMyCommands {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<BotCommandScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

method!(DeleteMyCommands, "deleteMyCommands", bool);

#[derive(Debug, Clone, Serialize)]
pub struct SendMessage {
    pub chat_id: ChatTarget,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_notification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_parameters: Option<ReplyParameters>,
}

impl SendMessage {
    pub fn new(chat_id: impl Into<ChatTarget>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            message_thread_id: None,
            parse_mode: None,
            disable_notification: None,
            reply_parameters: None,
        }
    }

    #[must_use]
    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_parameters = Some(ReplyParameters {
            message_id,
            allow_sending_without_reply: Some(true),
        });
        self
    }
}

method!(SendMessage, "sendMessage", Message);

#[derive(Debug, Clone, Serialize)]
pub struct SendDocument {
    pub chat_id: ChatTarget,
    pub document: InputFile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
}

impl SendDocument {
    pub fn new(chat_id: impl Into<ChatTarget>, document: InputFile) -> Self {
        Self {
            chat_id: chat_id.into(),
            document,
            caption: None,
            parse_mode: None,
        }
    }
}

impl Method for SendDocument {
    type Output = Message;

    const NAME: &'static str = "sendDocument";

    fn input_files(&self) -> Vec<(&'static str, &InputFile)> {
        vec![("document", &self.document)]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerCallbackQuery {
    pub callback_query_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_alert: Option<bool>,
}

impl AnswerCallbackQuery {
    pub fn new(callback_query_id: impl Into<String>) -> Self {
        Self {
            callback_query_id: callback_query_id.into(),
            text: None,
            show_alert: None,
        }
    }
}

method!(AnswerCallbackQuery, "answerCallbackQuery", bool);

/// Close the bot instance before moving it to another server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Close {}

method!(Close, "close", bool);

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogOut {}

method!(LogOut, "logOut", bool);
