//! Update classification and dispatch.
//!
//! One [`Update`] in, at most one [`ResponsePayload`] out. Collaborator
//! failures never escape `handle`: they are logged and turned into a degraded
//! reply for the user.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    config::UnrecognizedPolicy,
    contacts::{ContactRecord, ContactStore},
    convert::{derive_output_name, is_legacy_spreadsheet, DocumentConverter, TARGET_EXTENSION},
    domain::ChatId,
    errors::FetchError,
    ports::FileSource,
    response::{ReplyMarkup, ResponsePayload},
    texts::{self, TextCatalog},
    update::{ContactInfo, DocumentInfo, Intent, MessageMeta, Update},
};

pub const START_COMMAND: &str = "start";

const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 20 * 1024 * 1024;

pub struct Dispatcher {
    texts: Arc<TextCatalog>,
    contacts: Arc<dyn ContactStore>,
    converter: Arc<dyn DocumentConverter>,
    files: Arc<dyn FileSource>,
    policy: UnrecognizedPolicy,
    max_document_bytes: u64,
}

impl Dispatcher {
    pub fn new(
        texts: Arc<TextCatalog>,
        contacts: Arc<dyn ContactStore>,
        converter: Arc<dyn DocumentConverter>,
        files: Arc<dyn FileSource>,
    ) -> Self {
        Self {
            texts,
            contacts,
            converter,
            files,
            policy: UnrecognizedPolicy::default(),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }

    pub fn with_policy(mut self, policy: UnrecognizedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_document_bytes(mut self, max: u64) -> Self {
        self.max_document_bytes = max;
        self
    }

    pub async fn handle(&self, update: Update) -> Option<ResponsePayload> {
        match update.intent {
            Intent::Command { chat_id, name, .. } if name == START_COMMAND => {
                info!(chat_id = chat_id.0, "start command");
                Some(self.greeting(chat_id))
            }
            Intent::Contact {
                chat_id,
                contact,
                meta,
            } => Some(self.handle_contact(chat_id, contact, meta).await),
            Intent::Document { chat_id, document }
                if is_legacy_spreadsheet(
                    document.file_name.as_deref(),
                    document.mime_type.as_deref(),
                ) =>
            {
                Some(self.handle_spreadsheet(chat_id, document).await)
            }
            other => self.unrecognized(&other),
        }
    }

    fn greeting(&self, chat_id: ChatId) -> ResponsePayload {
        ResponsePayload::SendMessage {
            chat_id,
            text: self.texts.lookup(texts::GREETING_TEXT),
            reply_markup: Some(ReplyMarkup::contact_request(
                self.texts.lookup(texts::AUTHORIZE_BUTTON_TEXT),
            )),
        }
    }

    async fn handle_contact(
        &self,
        chat_id: ChatId,
        contact: ContactInfo,
        meta: MessageMeta,
    ) -> ResponsePayload {
        let display_name = display_name(&contact).unwrap_or_default();
        let record = ContactRecord {
            chat_id,
            phone_number: contact.phone_number.clone(),
            display_name: display_name.clone(),
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            user_id: contact.user_id,
            from_user_id: meta.from_user_id,
            message_id: meta.message_id,
            message_date: meta.date,
            captured_at: chrono::Utc::now().to_rfc3339(),
        };

        if let Err(e) = self.contacts.append(&record).await {
            error!(chat_id = chat_id.0, error = %e, "failed to persist contact");
            return ResponsePayload::text(chat_id, self.texts.lookup(texts::CONTACT_SAVE_FAILED));
        }
        info!(chat_id = chat_id.0, "contact saved");

        let label = if display_name.is_empty() {
            self.texts.lookup(texts::CONTACT_FALLBACK_LABEL)
        } else {
            display_name
        };
        ResponsePayload::text(
            chat_id,
            self.texts
                .format(texts::CONTACT_SAVED_TEMPLATE, &[("contact_label", label.as_str())]),
        )
    }

    async fn handle_spreadsheet(&self, chat_id: ChatId, document: DocumentInfo) -> ResponsePayload {
        let declared = document
            .file_name
            .clone()
            .unwrap_or_else(|| "document.xls".to_string());

        if document
            .file_size
            .is_some_and(|size| size > self.max_document_bytes)
        {
            warn!(
                chat_id = chat_id.0,
                size = document.file_size,
                max = self.max_document_bytes,
                "document rejected before download"
            );
            return ResponsePayload::text(chat_id, self.texts.lookup(texts::DOCUMENT_TOO_LARGE));
        }

        let bytes = match self
            .files
            .fetch(&document.file_id, self.max_document_bytes)
            .await
        {
            Ok(b) => b,
            Err(e @ FetchError::TooLarge { .. }) => {
                warn!(chat_id = chat_id.0, error = %e, "document rejected during download");
                return ResponsePayload::text(chat_id, self.texts.lookup(texts::DOCUMENT_TOO_LARGE));
            }
            Err(e) => {
                error!(chat_id = chat_id.0, file_id = %document.file_id, error = %e, "document download failed");
                return self.conversion_unavailable(chat_id);
            }
        };

        let input_len = bytes.len();
        match self.converter.convert(bytes, &declared).await {
            Ok(converted) => {
                let file_name = derive_output_name(&declared, TARGET_EXTENSION);
                info!(
                    chat_id = chat_id.0,
                    input_bytes = input_len,
                    output_bytes = converted.len(),
                    file_name = %file_name,
                    "document converted"
                );
                let caption = self
                    .texts
                    .format(texts::CONVERSION_DONE_CAPTION, &[("file_name", file_name.as_str())]);
                ResponsePayload::SendDocument {
                    chat_id,
                    file_name,
                    caption: Some(caption),
                    bytes: converted,
                }
            }
            Err(e) => {
                error!(chat_id = chat_id.0, kind = e.kind(), error = %e, "document conversion failed");
                self.conversion_unavailable(chat_id)
            }
        }
    }

    fn conversion_unavailable(&self, chat_id: ChatId) -> ResponsePayload {
        ResponsePayload::text(chat_id, self.texts.lookup(texts::CONVERSION_UNAVAILABLE))
    }

    fn unrecognized(&self, intent: &Intent) -> Option<ResponsePayload> {
        match (self.policy, intent.chat_id()) {
            (UnrecognizedPolicy::Fallback, Some(chat_id)) => Some(ResponsePayload::text(
                chat_id,
                self.texts.lookup(texts::FALLBACK_TEXT),
            )),
            _ => None,
        }
    }
}

/// "First Last", else the phone number.
fn display_name(contact: &ContactInfo) -> Option<String> {
    let parts = [contact.first_name.as_deref(), contact.last_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    if !parts.is_empty() {
        return Some(parts.join(" "));
    }
    contact
        .phone_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
