use std::{path::Path, sync::Arc};

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use cxb_core::{
    config::{load_dotenv_if_present, Config},
    contacts::JsonlContactStore,
    dispatcher::Dispatcher,
    texts::TextCatalog,
};
use cxb_soffice::{SofficeConfig, SofficeConverter};
use cxb_telegram::{
    server::{self, AppState},
    webhook::{self, WebhookOptions},
    TelegramFiles,
};

#[derive(Debug, Parser)]
#[command(name = "cxb", version, about = "Contact capture and xls conversion bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook server (default).
    Serve,
    /// Register the webhook URL with Telegram.
    #[command(name = "set-webhook")]
    SetWebhook(SetWebhookArgs),
}

#[derive(Debug, Args)]
struct SetWebhookArgs {
    /// Public https URL Telegram should POST updates to.
    url: String,
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: String,
    #[arg(long, env = "TELEGRAM_WEBHOOK_SECRET", hide_env_values = true)]
    secret_token: Option<String>,
    #[arg(long)]
    drop_pending_updates: bool,
    /// Repeatable, e.g. `--allowed-update message`.
    #[arg(long = "allowed-update")]
    allowed_updates: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before parsing so `env = ...` args can see `.env` values.
    load_dotenv_if_present(Path::new(".env"));
    let cli = Cli::parse();
    cxb_core::logging::init("cxb")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::SetWebhook(args) => {
            let opts = WebhookOptions {
                url: args.url,
                secret_token: args.secret_token,
                drop_pending_updates: args.drop_pending_updates,
                allowed_updates: args.allowed_updates,
            };
            webhook::set_webhook(&args.token, &opts).await?;
            Ok(())
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    let texts = Arc::new(TextCatalog::from_json_file(&cfg.texts_path));
    let contacts = Arc::new(JsonlContactStore::new(cfg.contact_storage_path.clone()));
    let converter = Arc::new(SofficeConverter::new(SofficeConfig::from_config(&cfg)));
    let telegram = Arc::new(TelegramFiles::from_token(cfg.telegram_bot_token.clone()));

    if let Err(e) = converter.resolve_binary() {
        // Not fatal: contacts keep working, conversions reply "unavailable".
        warn!(error = %e, "document converter is not available");
    }

    let dispatcher = Dispatcher::new(texts, contacts, converter, telegram.clone())
        .with_policy(cfg.unrecognized_policy)
        .with_max_document_bytes(cfg.max_document_bytes);

    info!(
        contacts = %cfg.contact_storage_path.display(),
        temp_dir = %cfg.temp_dir.display(),
        policy = ?cfg.unrecognized_policy,
        "cxb starting"
    );

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        delivery: telegram,
        webhook_secret: cfg.webhook_secret.clone(),
    };
    server::serve(&cfg, state).await
}
