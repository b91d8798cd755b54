use axum::body::Bytes;
use axum::Json;
use serde_json::{json, Value};

/// Characters of an update body kept in the log line.
const LOG_PREVIEW_CHARS: usize = 200;

/// POST /webhook/telegram: acknowledge Telegram updates.
///
/// Bot handling lives elsewhere; this endpoint only confirms receipt so
/// Telegram stops redelivering. Any body, including invalid JSON, is accepted.
pub async fn telegram_webhook(body: Bytes) -> Json<Value> {
    let text = String::from_utf8_lossy(&body);
    let preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
    tracing::info!(bytes = body.len(), preview = %preview, "Telegram update received");
    Json(json!({ "ok": true }))
}
