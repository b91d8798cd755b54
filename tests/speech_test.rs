//! Speech passthrough against a stand-in provider.

mod fixtures;
mod helpers;

use axum::http::{header, StatusCode};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use echome::services::speech::{SpeechClient, SpeechError, SPEECH_MODEL};
use helpers::*;

const API_KEY: &str = "test-xi-key";
const MP3: &[u8] = b"ID3\x04\x00fake-mp3-frames";

async fn provider_returning(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/voice-1"))
        .and(header_eq("xi-api-key", API_KEY))
        .and(body_partial_json(json!({ "text": "Hello", "model_id": SPEECH_MODEL })))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

fn client(server: &MockServer, timeout: Duration) -> SpeechClient {
    SpeechClient::new(&server.uri(), Some(API_KEY.to_string()), timeout).unwrap()
}

#[tokio::test]
async fn synthesize_returns_provider_audio() {
    let server = provider_returning(ResponseTemplate::new(200).set_body_bytes(MP3)).await;

    let audio = client(&server, Duration::from_secs(5))
        .synthesize("voice-1", "Hello")
        .await
        .unwrap();

    assert_eq!(&audio[..], MP3);
}

#[tokio::test]
async fn provider_rejection_keeps_its_message() {
    let server = provider_returning(
        ResponseTemplate::new(422).set_body_string("voice_not_found"),
    )
    .await;

    let err = client(&server, Duration::from_secs(5))
        .synthesize("voice-1", "Hello")
        .await
        .unwrap_err();

    match &err {
        SpeechError::Provider { status, message } => {
            assert_eq!(status.as_u16(), 422);
            assert_eq!(message, "voice_not_found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "ElevenLabs error: voice_not_found");
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = provider_returning(
        ResponseTemplate::new(200)
            .set_body_bytes(MP3)
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let err = client(&server, Duration::from_millis(200))
        .synthesize("voice-1", "Hello")
        .await
        .unwrap_err();

    assert!(matches!(err, SpeechError::Timeout), "got {err:?}");
}

#[tokio::test]
async fn missing_key_never_reaches_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = SpeechClient::new(&server.uri(), Some("  ".into()), Duration::from_secs(5)).unwrap();
    let err = client.synthesize("voice-1", "Hello").await.unwrap_err();

    assert!(matches!(err, SpeechError::NotConfigured));
}

#[tokio::test]
async fn speak_uses_the_personas_cloned_voice() {
    let server = provider_returning(ResponseTemplate::new(200).set_body_bytes(MP3)).await;
    let app = TestApp::with_speech(&server.uri(), Some(API_KEY));
    let token = token_for("ann@example.com");

    app.post_json(
        "/api/voice/clone",
        Some(&token),
        json!({ "persona_name": "Ann", "youtube_url": fixtures::YOUTUBE_URL }),
    )
    .await;
    let user_id = app.user_id("ann@example.com").await;
    app.store.set_persona_voice(user_id, "voice-1").await;

    let response = app
        .post_json("/api/voice/speak", Some(&token), json!({ "text": "Hello" }))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(response.headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(&response.body[..], MP3);
}

#[tokio::test]
async fn speak_surfaces_provider_failures() {
    let server = provider_returning(
        ResponseTemplate::new(401).set_body_string("invalid_api_key"),
    )
    .await;
    let app = TestApp::with_speech(&server.uri(), Some(API_KEY));

    let response = app
        .post_json(
            "/api/voice/speak",
            Some(&token_for("ann@example.com")),
            json!({ "text": "Hello", "voice_id": "voice-1" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error(), "ElevenLabs error: invalid_api_key");
}

#[tokio::test]
async fn long_text_is_left_to_the_provider() {
    let text = "a".repeat(6000);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/voice-1"))
        .and(body_partial_json(json!({ "text": text })))
        .respond_with(ResponseTemplate::new(400).set_body_string("text_too_long"))
        .expect(1)
        .mount(&server)
        .await;
    let app = TestApp::with_speech(&server.uri(), Some(API_KEY));

    let response = app
        .post_json(
            "/api/voice/speak",
            Some(&token_for("ann@example.com")),
            json!({ "text": text, "voice_id": "voice-1" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error(), "ElevenLabs error: text_too_long");
}
