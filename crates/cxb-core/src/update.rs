//! Incoming update decoding.
//!
//! The webhook body is decoded once into [`Update`], whose [`Intent`] is the
//! only thing the dispatcher inspects. Wire structs are lenient: every field is
//! optional and unknown fields are ignored. Besides the Bot API shape
//! (`{"message": {"chat": {"id": ..}, ..}}`) the flat shape
//! `{"chat_id": .., "text": ..}` is accepted as well.

use serde::Deserialize;

use crate::{
    domain::{ChatId, MessageId, UserId},
    Result,
};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(flatten)]
    pub inline: WireMessage,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub message_id: Option<i32>,
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub chat: Option<WireChat>,
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub from: Option<WireUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub contact: Option<WireContact>,
    #[serde(default)]
    pub document: Option<WireDocument>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireChat {
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireUser {
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireContact {
    #[serde(default, alias = "phone")]
    pub phone_number: Option<String>,
    #[serde(default, alias = "name")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireDocument {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Shared contact, as received.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactInfo {
    pub phone_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_id: Option<UserId>,
}

/// Message metadata kept alongside a contact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageMeta {
    pub message_id: Option<MessageId>,
    pub date: Option<i64>,
    pub from_user_id: Option<UserId>,
}

/// Uploaded document, as received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentInfo {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

/// What an update asks the bot to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    /// `/name args`; `name` is lower-cased without the slash or `@botname`.
    Command {
        chat_id: ChatId,
        name: String,
        args: String,
    },
    Contact {
        chat_id: ChatId,
        contact: ContactInfo,
        meta: MessageMeta,
    },
    Document {
        chat_id: ChatId,
        document: DocumentInfo,
    },
    Unknown {
        chat_id: Option<ChatId>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub update_id: Option<i64>,
    pub intent: Intent,
}

impl Update {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let wire: WireUpdate = serde_json::from_slice(body)?;
        Ok(Self::from(wire))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let wire: WireUpdate = serde_json::from_value(value)?;
        Ok(Self::from(wire))
    }
}

impl Intent {
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            Intent::Command { chat_id, .. }
            | Intent::Contact { chat_id, .. }
            | Intent::Document { chat_id, .. } => Some(*chat_id),
            Intent::Unknown { chat_id } => *chat_id,
        }
    }
}

impl From<WireUpdate> for Update {
    fn from(wire: WireUpdate) -> Self {
        let msg = wire.message.unwrap_or(wire.inline);
        Self {
            update_id: wire.update_id,
            intent: classify(msg),
        }
    }
}

fn classify(msg: WireMessage) -> Intent {
    let chat_id = msg
        .chat
        .as_ref()
        .and_then(|c| c.id)
        .or(msg.chat_id)
        .map(ChatId);
    let Some(chat_id) = chat_id else {
        return Intent::Unknown { chat_id: None };
    };

    if let Some((name, args)) = msg.text.as_deref().and_then(parse_command) {
        return Intent::Command {
            chat_id,
            name,
            args,
        };
    }

    if let Some(c) = msg.contact {
        return Intent::Contact {
            chat_id,
            contact: ContactInfo {
                phone_number: c.phone_number.and_then(non_blank),
                first_name: c.first_name.and_then(non_blank),
                last_name: c.last_name.and_then(non_blank),
                user_id: c.user_id.map(UserId),
            },
            meta: MessageMeta {
                message_id: msg.message_id.map(MessageId),
                date: msg.date,
                from_user_id: msg.from.and_then(|u| u.id).map(UserId),
            },
        };
    }

    if let Some(d) = msg.document {
        if let Some(file_id) = d.file_id.and_then(non_blank) {
            return Intent::Document {
                chat_id,
                document: DocumentInfo {
                    file_id,
                    file_name: d.file_name,
                    mime_type: d.mime_type,
                    file_size: d.file_size,
                },
            };
        }
    }

    Intent::Unknown {
        chat_id: Some(chat_id),
    }
}

/// Split `/start@my_bot payload` into (`start`, `payload`).
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((h, a)) => (h, a.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or_default().to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, args.to_string()))
}

fn non_blank(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
