use std::{fmt, str::FromStr};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as _,
    ser::{Error as _, SerializeMap},
};

use crate::{
    error::UpdateError,
    types::{CallbackQuery, InlineQuery, Message},
};

/// Every event kind the Bot API can deliver, by its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    BusinessConnection,
    BusinessMessage,
    EditedBusinessMessage,
    DeletedBusinessMessages,
    MessageReaction,
    MessageReactionCount,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    PurchasedPaidMedia,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
    ChatBoost,
    RemovedChatBoost,
}

impl UpdateType {
    pub const ALL: [Self; 23] = [
        Self::Message,
        Self::EditedMessage,
        Self::ChannelPost,
        Self::EditedChannelPost,
        Self::BusinessConnection,
        Self::BusinessMessage,
        Self::EditedBusinessMessage,
        Self::DeletedBusinessMessages,
        Self::MessageReaction,
        Self::MessageReactionCount,
        Self::InlineQuery,
        Self::ChosenInlineResult,
        Self::CallbackQuery,
        Self::ShippingQuery,
        Self::PreCheckoutQuery,
        Self::PurchasedPaidMedia,
        Self::Poll,
        Self::PollAnswer,
        Self::MyChatMember,
        Self::ChatMember,
        Self::ChatJoinRequest,
        Self::ChatBoost,
        Self::RemovedChatBoost,
    ];

    /// Wire name, as used in `allowed_updates` and as the update object key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::BusinessConnection => "business_connection",
            Self::BusinessMessage => "business_message",
            Self::EditedBusinessMessage => "edited_business_message",
            Self::DeletedBusinessMessages => "deleted_business_messages",
            Self::MessageReaction => "message_reaction",
            Self::MessageReactionCount => "message_reaction_count",
            Self::InlineQuery => "inline_query",
            Self::ChosenInlineResult => "chosen_inline_result",
            Self::CallbackQuery => "callback_query",
            Self::ShippingQuery => "shipping_query",
            Self::PreCheckoutQuery => "pre_checkout_query",
            Self::PurchasedPaidMedia => "purchased_paid_media",
            Self::Poll => "poll",
            Self::PollAnswer => "poll_answer",
            Self::MyChatMember => "my_chat_member",
            Self::ChatMember => "chat_member",
            Self::ChatJoinRequest => "chat_join_request",
            Self::ChatBoost => "chat_boost",
            Self::RemovedChatBoost => "removed_chat_boost",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown update type: {s}"))
    }
}

/// The single event carried by an [`Update`].
///
/// Message-like and query kinds are typed; the remaining kinds keep their
/// raw JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    BusinessMessage(Message),
    EditedBusinessMessage(Message),
    InlineQuery(InlineQuery),
    CallbackQuery(CallbackQuery),
    Other {
        kind: UpdateType,
        payload: serde_json::Value,
    },
}

impl UpdateKind {
    #[must_use]
    pub fn update_type(&self) -> UpdateType {
        match self {
            Self::Message(_) => UpdateType::Message,
            Self::EditedMessage(_) => UpdateType::EditedMessage,
            Self::ChannelPost(_) => UpdateType::ChannelPost,
            Self::EditedChannelPost(_) => UpdateType::EditedChannelPost,
            Self::BusinessMessage(_) => UpdateType::BusinessMessage,
            Self::EditedBusinessMessage(_) => UpdateType::EditedBusinessMessage,
            Self::InlineQuery(_) => UpdateType::InlineQuery,
            Self::CallbackQuery(_) => UpdateType::CallbackQuery,
            Self::Other { kind, .. } => *kind,
        }
    }

    fn decode(kind: UpdateType, payload: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            UpdateType::Message => Self::Message(serde_json::from_value(payload)?),
            UpdateType::EditedMessage => Self::EditedMessage(serde_json::from_value(payload)?),
            UpdateType::ChannelPost => Self::ChannelPost(serde_json::from_value(payload)?),
            UpdateType::EditedChannelPost => {
                Self::EditedChannelPost(serde_json::from_value(payload)?)
            },
            UpdateType::BusinessMessage => Self::BusinessMessage(serde_json::from_value(payload)?),
            UpdateType::EditedBusinessMessage => {
                Self::EditedBusinessMessage(serde_json::from_value(payload)?)
            },
            UpdateType::InlineQuery => Self::InlineQuery(serde_json::from_value(payload)?),
            UpdateType::CallbackQuery => Self::CallbackQuery(serde_json::from_value(payload)?),
            kind => Self::Other { kind, payload },
        })
    }
}

/// One inbound event with its sequence id.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub kind: UpdateKind,
}

impl Update {
    #[must_use]
    pub fn update_type(&self) -> UpdateType {
        self.kind.update_type()
    }

    /// The message carried by any of the message-like kinds.
    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m)
            | UpdateKind::BusinessMessage(m)
            | UpdateKind::EditedBusinessMessage(m) => Some(m),
            _ => None,
        }
    }

    /// Map a decoded JSON object onto exactly one event kind.
    pub fn from_object(
        update_id: i64,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, UpdateError> {
        let mut present: Vec<(String, serde_json::Value)> = fields
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect();

        if present.len() > 1 {
            return Err(UpdateError::MultipleKinds {
                update_id,
                kinds: present.into_iter().map(|(key, _)| key).collect(),
            });
        }
        let Some((key, payload)) = present.pop() else {
            return Err(UpdateError::MissingKind { update_id });
        };
        let update_type = key
            .parse::<UpdateType>()
            .map_err(|_| UpdateError::UnknownKind {
                update_id,
                kind: key.clone(),
            })?;
        let kind =
            UpdateKind::decode(update_type, payload).map_err(|source| UpdateError::Payload {
                update_id,
                kind: update_type.as_str(),
                source,
            })?;

        Ok(Self { update_id, kind })
    }
}

/// An update as delivered, before its event is classified.
///
/// Decoding only requires `update_id`, so a batch containing kinds this
/// crate does not know still decodes and the offset can move past them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawUpdate {
    pub update_id: i64,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawUpdate {
    pub fn classify(self) -> Result<Update, UpdateError> {
        Update::from_object(self.update_id, self.fields)
    }
}

impl<'de> Deserialize<'de> for Update {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawUpdate::deserialize(deserializer)?
            .classify()
            .map_err(D::Error::custom)
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("update_id", &self.update_id)?;
        let key = self.update_type().as_str();
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m)
            | UpdateKind::BusinessMessage(m)
            | UpdateKind::EditedBusinessMessage(m) => map.serialize_entry(key, m)?,
            UpdateKind::InlineQuery(q) => map.serialize_entry(key, q)?,
            UpdateKind::CallbackQuery(q) => map.serialize_entry(key, q)?,
            UpdateKind::Other { payload, .. } => {
                if payload.is_null() {
                    return Err(S::Error::custom("update payload is null"));
                }
                map.serialize_entry(key, payload)?;
            },
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use {rstest::rstest, serde_json::json};

    use super::*;

    fn text_message(text: &str) -> serde_json::Value {
        json!({
            "message_id": 7,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "text": text
        })
    }

    #[test]
    fn decodes_message_update() {
        let update: Update =
            serde_json::from_value(json!({ "update_id": 10, "message": text_message("hi") }))
                .unwrap();
        assert_eq!(update.update_id, 10);
        assert_eq!(update.update_type(), UpdateType::Message);
        assert_eq!(update.message().unwrap().text.as_deref(), Some("hi"));
    }

    #[test]
    fn untyped_kinds_keep_raw_payload() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 3,
            "poll": { "id": "p1", "question": "?" }
        }))
        .unwrap();
        match update.kind {
            UpdateKind::Other { kind, payload } => {
                assert_eq!(kind, UpdateType::Poll);
                assert_eq!(payload["id"], "p1");
            },
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn rejects_update_without_event() {
        let err = serde_json::from_value::<Update>(json!({ "update_id": 1 })).unwrap_err();
        assert!(err.to_string().contains("carries no event"), "{err}");
    }

    #[test]
    fn rejects_update_with_two_events() {
        let err = serde_json::from_value::<Update>(json!({
            "update_id": 1,
            "message": text_message("a"),
            "edited_message": text_message("b")
        }))
        .unwrap_err();
        assert!(err.to_string().contains("more than one event"), "{err}");
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = serde_json::from_value::<Update>(json!({ "update_id": 1, "teleport": {} }))
            .unwrap_err();
        assert!(err.to_string().contains("teleport"), "{err}");
    }

    #[test]
    fn raw_updates_decode_whatever_the_kind() {
        let batch: Vec<RawUpdate> = serde_json::from_value(json!([
            { "update_id": 1, "message": text_message("a") },
            { "update_id": 2, "some_future_kind": { "x": 1 } }
        ]))
        .unwrap();
        assert_eq!(batch.len(), 2);

        let mut batch = batch.into_iter();
        let first = batch.next().unwrap().classify().unwrap();
        assert_eq!(first.update_type(), UpdateType::Message);
        assert!(matches!(
            batch.next().unwrap().classify(),
            Err(UpdateError::UnknownKind { update_id: 2, ref kind }) if kind == "some_future_kind"
        ));
    }

    #[test]
    fn null_fields_are_ignored() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 5,
            "message": text_message("x"),
            "edited_message": null
        }))
        .unwrap();
        assert_eq!(update.update_type(), UpdateType::Message);
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 9,
            "channel_post": text_message("news")
        }))
        .unwrap();
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["update_id"], 9);
        assert_eq!(value["channel_post"]["text"], "news");
    }

    #[rstest]
    #[case("message", UpdateType::Message)]
    #[case("edited_channel_post", UpdateType::EditedChannelPost)]
    #[case("callback_query", UpdateType::CallbackQuery)]
    #[case("removed_chat_boost", UpdateType::RemovedChatBoost)]
    fn update_type_wire_names(#[case] wire: &str, #[case] expected: UpdateType) {
        assert_eq!(wire.parse::<UpdateType>().unwrap(), expected);
        assert_eq!(expected.as_str(), wire);
        assert_eq!(
            serde_json::to_value(expected).unwrap(),
            serde_json::Value::String(wire.into())
        );
    }
}
