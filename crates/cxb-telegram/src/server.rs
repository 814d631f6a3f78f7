use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

use cxb_core::{config::Config, dispatcher::Dispatcher, response::ResponsePayload, update::Update};

use crate::DocumentDelivery;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub delivery: Arc<dyn DocumentDelivery>,
    pub webhook_secret: Option<String>,
}

pub fn router(state: AppState, webhook_path: &str) -> Router {
    let app = if webhook_path == "/" {
        Router::new().route("/", get(health).post(webhook))
    } else {
        Router::new()
            .route("/", get(health))
            .route(webhook_path, post(webhook))
    };
    app.with_state(state)
}

/// Bind `cfg.bind_addr()` and serve until ctrl-c.
pub async fn serve(cfg: &Config, state: AppState) -> anyhow::Result<()> {
    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, path = %cfg.webhook_path, "webhook server listening");

    axum::serve(listener, router(state, &cfg.webhook_path))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "running"}))
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(expected) = &state.webhook_secret {
        let got = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if got != Some(expected.as_str()) {
            warn!("webhook request with missing or wrong secret token");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"status": "unauthorized"})),
            )
                .into_response();
        }
    }

    let update = match Update::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            debug!(error = %e, "ignoring undecodable update");
            return Json(json!({"status": "ignored"})).into_response();
        }
    };

    match state.dispatcher.handle(update).await {
        None => Json(json!({"status": "ok"})).into_response(),
        Some(payload @ ResponsePayload::SendMessage { .. }) => Json(payload).into_response(),
        Some(ResponsePayload::SendDocument {
            chat_id,
            file_name,
            caption,
            bytes,
        }) => {
            if let Err(e) = state
                .delivery
                .send_document(chat_id, &file_name, caption.as_deref(), bytes)
                .await
            {
                error!(chat_id = chat_id.0, error = %e, "failed to upload converted document");
            }
            Json(json!({"status": "ok"})).into_response()
        }
    }
}
