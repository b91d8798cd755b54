//! Job rows as the workers leave them.

#![allow(dead_code)]

use serde_json::Value;
use uuid::Uuid;

use echome::models::job::{Job, JobInput, JobStatus, VoiceSourceInput};

pub const YOUTUBE_URL: &str = "https://y/1";

/// A `voice_extract` job for `user_id` at `status` with the given output.
pub fn extract_job(user_id: Uuid, status: JobStatus, output: Option<Value>) -> Job {
    let input = JobInput::VoiceExtract(VoiceSourceInput {
        persona_id: Uuid::new_v4(),
        youtube_url: YOUTUBE_URL.to_string(),
        persona_name: "Ann".to_string(),
    });
    let mut job = Job::pending(Uuid::new_v4(), user_id, &input).expect("job fixture");
    job.status = status;
    job.output = output;
    job
}

/// A completed extraction whose worker stored its output as a JSON string.
pub fn completed_extract_job(user_id: Uuid, audio_path: &str) -> Job {
    let output = serde_json::json!({ "audio_path": audio_path }).to_string();
    extract_job(user_id, JobStatus::Completed, Some(Value::String(output)))
}
