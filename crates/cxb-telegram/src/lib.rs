//! Telegram adapter (teloxide + axum).
//!
//! Implements the core's [`FileSource`] port over the Bot API, uploads
//! converted documents, and serves the webhook endpoint.

use async_trait::async_trait;

use teloxide::{net::Download, prelude::*, types::InputFile};

pub mod server;
pub mod webhook;

use cxb_core::{
    domain::ChatId,
    errors::{Error, FetchError},
    ports::FileSource,
    Result,
};
use tracing::debug;

/// Outbound document upload.
///
/// A webhook reply can only carry JSON, so document payloads are delivered
/// through this port instead of the HTTP response.
#[async_trait]
pub trait DocumentDelivery: Send + Sync {
    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        caption: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct TelegramFiles {
    bot: Bot,
}

impl TelegramFiles {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl FileSource for TelegramFiles {
    async fn fetch(&self, file_id: &str, max_bytes: u64) -> std::result::Result<Vec<u8>, FetchError> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(|e| FetchError::External(format!("getFile failed: {e}")))?;

        let size = file.meta.size as u64;
        if size > max_bytes {
            return Err(FetchError::TooLarge {
                size,
                max: max_bytes,
            });
        }

        let mut dst: Vec<u8> = Vec::with_capacity(size as usize);
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(|e| FetchError::External(format!("download failed: {e}")))?;

        // getFile may report 0 for unknown sizes; enforce the bound on the body too.
        if dst.len() as u64 > max_bytes {
            return Err(FetchError::TooLarge {
                size: dst.len() as u64,
                max: max_bytes,
            });
        }
        debug!(file_id, bytes = dst.len(), "file downloaded");
        Ok(dst)
    }
}

#[async_trait]
impl DocumentDelivery for TelegramFiles {
    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        caption: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let input = InputFile::memory(bytes).file_name(file_name.to_string());
        let mut req = self.bot.send_document(Self::tg_chat(chat_id), input);
        if let Some(c) = caption {
            req = req.caption(c.to_string());
        }
        req.await.map_err(Self::map_err)?;
        Ok(())
    }
}
