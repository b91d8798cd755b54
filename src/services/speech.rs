use axum::body::Bytes;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;

/// Model used for every synthesis request.
pub const SPEECH_MODEL: &str = "eleven_multilingual_v2";

/// Client for the ElevenLabs text-to-speech API.
pub struct SpeechClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SpeechClient {
    /// `api_key` may be absent; synthesis then fails with
    /// [`SpeechError::NotConfigured`] instead of the server refusing to start.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SpeechError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SpeechError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Synthesize `text` with the given voice and return the MP3 bytes.
    pub async fn synthesize(&self, voice_id: &str, text: &str) -> Result<Bytes, SpeechError> {
        let api_key = self.api_key.as_deref().ok_or(SpeechError::NotConfigured)?;
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", api_key)
            .header(header::ACCEPT, "audio/mpeg")
            .json(&serde_json::json!({
                "text": text,
                "model_id": SPEECH_MODEL,
            }))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SpeechError::Provider { status, message });
        }

        response.bytes().await.map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> SpeechError {
    if err.is_timeout() {
        SpeechError::Timeout
    } else {
        SpeechError::Http(err)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("ELEVENLABS_API_KEY not configured")]
    NotConfigured,

    #[error("ElevenLabs request timed out")]
    Timeout,

    #[error("ElevenLabs request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ElevenLabs error: {message}")]
    Provider { status: StatusCode, message: String },
}
