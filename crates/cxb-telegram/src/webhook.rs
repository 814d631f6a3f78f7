//! One-shot webhook registration (`setWebhook`).

use teloxide::{prelude::*, types::AllowedUpdate};
use tracing::{info, warn};

use cxb_core::{errors::Error, Result};

#[derive(Clone, Debug, Default)]
pub struct WebhookOptions {
    pub url: String,
    pub secret_token: Option<String>,
    pub drop_pending_updates: bool,
    /// Bot API update type names, e.g. `message`.
    pub allowed_updates: Vec<String>,
}

pub async fn set_webhook(token: &str, opts: &WebhookOptions) -> Result<()> {
    let url = parse_url(&opts.url)?;
    let allowed = parse_allowed_updates(&opts.allowed_updates)?;
    if url.scheme() != "https" {
        warn!(url = %url, "Telegram only delivers webhooks to https URLs");
    }

    let bot = Bot::new(token);
    let mut req = bot.set_webhook(url.clone());
    if let Some(secret) = opts.secret_token.as_deref().filter(|s| !s.is_empty()) {
        req = req.secret_token(secret.to_string());
    }
    if opts.drop_pending_updates {
        req = req.drop_pending_updates(true);
    }
    if !allowed.is_empty() {
        req = req.allowed_updates(allowed);
    }
    req.await
        .map_err(|e| Error::External(format!("setWebhook failed: {e}")))?;

    info!(url = %url, "webhook registered");
    Ok(())
}

fn parse_url(raw: &str) -> Result<reqwest::Url> {
    reqwest::Url::parse(raw.trim())
        .map_err(|e| Error::Config(format!("invalid webhook url `{raw}`: {e}")))
}

fn parse_allowed_updates(names: &[String]) -> Result<Vec<AllowedUpdate>> {
    names
        .iter()
        .map(|n| {
            serde_json::from_value(serde_json::Value::String(n.trim().to_string()))
                .map_err(|_| Error::Config(format!("unknown update type `{n}`")))
        })
        .collect()
}
