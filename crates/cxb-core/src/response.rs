use serde::Serialize;

use crate::domain::ChatId;

/// The single reply the core asks the transport to deliver for an update.
///
/// Serializes to the Bot API "reply in webhook response" shape, e.g.
/// `{"method":"sendMessage","chat_id":1,"text":"..."}`. Document bytes are
/// never part of the JSON; the transport uploads them separately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "method")]
pub enum ResponsePayload {
    #[serde(rename = "sendMessage")]
    SendMessage {
        chat_id: ChatId,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_markup: Option<ReplyMarkup>,
    },
    #[serde(rename = "sendDocument")]
    SendDocument {
        chat_id: ChatId,
        file_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(skip)]
        bytes: Vec<u8>,
    },
}

impl ResponsePayload {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self::SendMessage {
            chat_id,
            text: text.into(),
            reply_markup: None,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            ResponsePayload::SendMessage { .. } => "sendMessage",
            ResponsePayload::SendDocument { .. } => "sendDocument",
        }
    }

    pub fn chat_id(&self) -> ChatId {
        match self {
            ResponsePayload::SendMessage { chat_id, .. }
            | ResponsePayload::SendDocument { chat_id, .. } => *chat_id,
        }
    }
}

/// Reply keyboard (`ReplyKeyboardMarkup`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplyMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    pub resize_keyboard: bool,
    pub one_time_keyboard: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub request_contact: bool,
}

impl ReplyMarkup {
    /// Single one-time button that shares the user's phone number.
    pub fn contact_request(label: impl Into<String>) -> Self {
        Self {
            keyboard: vec![vec![KeyboardButton {
                text: label.into(),
                request_contact: true,
            }]],
            resize_keyboard: true,
            one_time_keyboard: true,
        }
    }
}
