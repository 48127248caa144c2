use std::fmt;

use serde::{Deserialize, Serialize};

/// A chat addressed by numeric id or by `@channelusername`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl From<i64> for ChatTarget {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ChatTarget {
    fn from(username: &str) -> Self {
        Self::Username(username.to_string())
    }
}

impl From<String> for ChatTarget {
    fn from(username: String) -> Self {
        Self::Username(username)
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => f.write_str(name),
        }
    }
}

/// Where a command menu is visible.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotCommandScope {
    #[default]
    Default,
    AllPrivateChats,
    AllGroupChats,
    AllChatAdministrators,
    Chat {
        chat_id: ChatTarget,
    },
    ChatAdministrators {
        chat_id: ChatTarget,
    },
    ChatMember {
        chat_id: ChatTarget,
        user_id: i64,
    },
}

impl BotCommandScope {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AllPrivateChats => "all_private_chats",
            Self::AllGroupChats => "all_group_chats",
            Self::AllChatAdministrators => "all_chat_administrators",
            Self::Chat { .. } => "chat",
            Self::ChatAdministrators { .. } => "chat_administrators",
            Self::ChatMember { .. } => "chat_member",
        }
    }
}

/// Lookup key for command visibility: a scope, optionally narrowed to a locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    pub scope: BotCommandScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl ScopeKey {
    #[must_use]
    pub fn new(scope: BotCommandScope) -> Self {
        Self {
            scope,
            language_code: None,
        }
    }

    pub fn chat(chat_id: impl Into<ChatTarget>) -> Self {
        Self::new(BotCommandScope::Chat {
            chat_id: chat_id.into(),
        })
    }

    pub fn chat_administrators(chat_id: impl Into<ChatTarget>) -> Self {
        Self::new(BotCommandScope::ChatAdministrators {
            chat_id: chat_id.into(),
        })
    }

    pub fn chat_member(chat_id: impl Into<ChatTarget>, user_id: i64) -> Self {
        Self::new(BotCommandScope::ChatMember {
            chat_id: chat_id.into(),
            user_id,
        })
    }

    #[must_use]
    pub fn with_locale(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = Some(language_code.into());
        self
    }
}

impl From<BotCommandScope> for ScopeKey {
    fn from(scope: BotCommandScope) -> Self {
        Self::new(scope)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scope.kind())?;
        match &self.scope {
            BotCommandScope::Chat { chat_id } | BotCommandScope::ChatAdministrators { chat_id } => {
                write!(f, ":{chat_id}")?;
            },
            BotCommandScope::ChatMember { chat_id, user_id } => write!(f, ":{chat_id}:{user_id}")?,
            _ => {},
        }
        if let Some(lang) = &self.language_code {
            write!(f, "[{lang}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {rstest::rstest, serde_json::json};

    use super::*;

    #[rstest]
    #[case(BotCommandScope::Default, json!({ "type": "default" }))]
    #[case(BotCommandScope::AllGroupChats, json!({ "type": "all_group_chats" }))]
    #[case(
        BotCommandScope::Chat { chat_id: ChatTarget::Id(-100) },
        json!({ "type": "chat", "chat_id": -100 })
    )]
    #[case(
        BotCommandScope::ChatMember { chat_id: "@news".into(), user_id: 7 },
        json!({ "type": "chat_member", "chat_id": "@news", "user_id": 7 })
    )]
    fn scope_wire_shape(#[case] scope: BotCommandScope, #[case] expected: serde_json::Value) {
        assert_eq!(serde_json::to_value(&scope).unwrap(), expected);
        let back: BotCommandScope = serde_json::from_value(expected).unwrap();
        assert_eq!(back, scope);
    }

    #[test]
    fn scope_key_display() {
        assert_eq!(ScopeKey::default().to_string(), "default");
        assert_eq!(
            ScopeKey::chat_member(5, 9).with_locale("en").to_string(),
            "chat_member:5:9[en]"
        );
    }

    #[test]
    fn keys_differ_by_locale() {
        let plain = ScopeKey::chat(1);
        let localized = ScopeKey::chat(1).with_locale("de");
        assert_ne!(plain, localized);
    }
}
