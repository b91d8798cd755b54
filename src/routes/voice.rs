use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::job::{Job, JobInput, JobStatus, JobType, VoiceJobKind};
use crate::models::persona::PersonaDraft;
use crate::models::requests::{
    non_blank, CloneRequest, ExtractRequest, JobResponse, SpeakRequest, SubmitResponse, QUEUED,
};
use crate::services::dispatch;

/// Responses carrying generated audio.
fn audio_response(bytes: impl Into<Body>) -> Response {
    (
        [(CONTENT_TYPE, "audio/mpeg"), (CACHE_CONTROL, "no-store")],
        bytes.into(),
    )
        .into_response()
}

/// Look up a job owned by `user`. Unknown ids, malformed ids and other
/// users' jobs are indistinguishable.
async fn find_owned_job(state: &AppState, user: &AuthUser, raw_id: &str) -> AppResult<Job> {
    let not_found = || AppError::NotFound("Job not found".to_string());
    let job_id = Uuid::parse_str(raw_id).map_err(|_| not_found())?;
    state
        .store
        .find_job(user.id, job_id)
        .await?
        .ok_or_else(not_found)
}

/// Commit a voice job, push it onto its queue and build the response.
async fn submit_voice(
    state: &AppState,
    user: &AuthUser,
    persona_name: String,
    kind: VoiceJobKind,
    message: String,
) -> AppResult<Json<SubmitResponse>> {
    let job_type = kind.job_type();
    let persona = PersonaDraft {
        name: persona_name,
        source_url: kind.source_url().map(str::to_string),
        reset_voice: kind.resets_voice(),
    };

    let submitted = state
        .store
        .submit_voice_job(user.id, Uuid::new_v4(), &persona, kind)
        .await?;
    metrics::counter!("jobs_submitted_total", "type" => job_type.to_string()).increment(1);

    tracing::info!(
        job_id = %submitted.job_id,
        job_type = %job_type,
        user_id = %user.id,
        persona_id = ?submitted.persona_id,
        "Voice job submitted"
    );

    dispatch::deliver_or_defer(state, submitted.job_id, job_type.queue()).await;

    Ok(Json(SubmitResponse {
        job_id: submitted.job_id,
        status: QUEUED.to_string(),
        message,
    }))
}

/// POST /api/voice/extract: queue audio extraction from a YouTube video.
pub async fn submit_extract(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> AppResult<Json<SubmitResponse>> {
    let Json(request) = payload?;
    let youtube_url = request.youtube_url.trim().to_string();
    let persona_name = request.persona_name.trim().to_string();
    if youtube_url.is_empty() || persona_name.is_empty() {
        return Err(AppError::Validation(
            "youtube_url and persona_name required".to_string(),
        ));
    }
    request.validate()?;

    submit_voice(
        &state,
        &user,
        persona_name,
        VoiceJobKind::Extract { youtube_url },
        "Audio extraction queued".to_string(),
    )
    .await
}

/// POST /api/voice/clone: queue voice cloning from a YouTube URL or from
/// the audio of a completed extraction job.
pub async fn submit_clone(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CloneRequest>, JsonRejection>,
) -> AppResult<Json<SubmitResponse>> {
    let Json(request) = payload?;
    let persona_name = request.persona_name.trim().to_string();
    if persona_name.is_empty() {
        return Err(AppError::Validation("persona_name required".to_string()));
    }
    request.validate()?;

    let youtube_url = non_blank(request.youtube_url);
    let kind = match (request.extract_job_id, youtube_url) {
        (Some(extract_job_id), youtube_url) => {
            resolve_extraction(&state, &user, extract_job_id, youtube_url).await?
        }
        (None, Some(youtube_url)) => VoiceJobKind::Clone { youtube_url },
        (None, None) => {
            return Err(AppError::Validation(
                "youtube_url or extract_job_id required".to_string(),
            ))
        }
    };

    let message = format!("Voice clone job queued for \"{persona_name}\"");
    submit_voice(&state, &user, persona_name, kind, message).await
}

/// Check that `extract_job_id` names a completed extraction owned by the
/// caller and carry its audio into the clone job.
async fn resolve_extraction(
    state: &AppState,
    user: &AuthUser,
    extract_job_id: Uuid,
    youtube_url: Option<String>,
) -> AppResult<VoiceJobKind> {
    let job = state
        .store
        .find_job(user.id, extract_job_id)
        .await?
        .ok_or_else(|| AppError::Validation("Extract job not found".to_string()))?;

    if job.job_type != JobType::VoiceExtract {
        return Err(AppError::Validation(
            "Referenced job is not an audio extraction".to_string(),
        ));
    }
    if job.status != JobStatus::Completed {
        return Err(AppError::Validation(
            "Extract job is not completed".to_string(),
        ));
    }

    let audio_path = job
        .output()
        .ok()
        .and_then(|output| output.audio_path)
        .ok_or_else(|| AppError::Validation("Extract job has no audio".to_string()))?;

    let source_url = youtube_url.or_else(|| match job.input() {
        Ok(JobInput::VoiceExtract(input)) => Some(input.youtube_url),
        _ => None,
    });

    Ok(VoiceJobKind::CloneFromExtract {
        extract_job_id,
        audio_path,
        youtube_url: source_url,
    })
}

/// GET /api/voice/jobs/{id}: the caller's job, as stored.
pub async fn get_job(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<JobResponse>> {
    let job = find_owned_job(&state, &user, &id).await?;
    Ok(Json(JobResponse { job }))
}

/// GET /api/voice/audio/{job_id}: the audio a completed extraction produced.
pub async fn get_audio(
    user: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let job = find_owned_job(&state, &user, &job_id).await?;

    if job.job_type != JobType::VoiceExtract || job.status != JobStatus::Completed {
        return Err(AppError::Validation("Audio not ready".to_string()));
    }

    let audio_path = job
        .output()?
        .audio_path
        .ok_or_else(|| AppError::NotFound("Audio path missing".to_string()))?;

    let (file, len) = state.artifacts.open(&audio_path).await?;
    tracing::debug!(job_id = %job.id, bytes = len, "Streaming extracted audio");

    Ok((
        [(CONTENT_LENGTH, len.to_string())],
        audio_response(Body::from_stream(ReaderStream::new(file))),
    )
        .into_response())
}

/// POST /api/voice/speak: synthesize speech with the given or the
/// persona's cloned voice.
pub async fn speak(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<SpeakRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload?;
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text required".to_string()));
    }
    request.validate()?;

    let voice_id = match non_blank(request.voice_id) {
        Some(voice_id) => voice_id,
        None => state
            .store
            .find_persona(user.id)
            .await?
            .and_then(|persona| persona.voice_id)
            .ok_or_else(|| AppError::Validation("No cloned voice found".to_string()))?,
    };

    let started = std::time::Instant::now();
    match state.speech.synthesize(&voice_id, &request.text).await {
        Ok(audio) => {
            metrics::counter!("speech_requests_total", "outcome" => "ok").increment(1);
            tracing::info!(
                user_id = %user.id,
                voice_id = %voice_id,
                duration_ms = started.elapsed().as_millis() as u64,
                bytes = audio.len(),
                "Speech synthesized"
            );
            Ok(audio_response(audio))
        }
        Err(e) => {
            metrics::counter!("speech_requests_total", "outcome" => "error").increment(1);
            Err(e.into())
        }
    }
}
