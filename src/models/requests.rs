use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::Job;
use crate::models::product::Product;

/// Status reported for every accepted submission.
pub const QUEUED: &str = "queued";

/// Body of `POST /api/voice/extract`. Missing fields deserialize as empty
/// so that validation, not the JSON extractor, reports them.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ExtractRequest {
    #[garde(length(min = 1, max = 2048))]
    pub youtube_url: String,

    #[garde(length(min = 1, max = 200))]
    pub persona_name: String,
}

/// Body of `POST /api/voice/clone`. One of `youtube_url` or
/// `extract_job_id` must be present.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CloneRequest {
    #[garde(length(min = 1, max = 200))]
    pub persona_name: String,

    #[garde(length(max = 2048))]
    pub youtube_url: Option<String>,

    #[garde(skip)]
    pub extract_job_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SpeakRequest {
    #[garde(length(min = 1))]
    pub text: String,

    #[garde(length(max = 200))]
    pub voice_id: Option<String>,
}

/// Response after a job has been accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductUploadResponse {
    pub status: String,
    pub product_id: Uuid,
    pub job_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub job: Job,
}

/// Treat blank optional strings the same as absent ones.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_extract_fields_fail_validation() {
        let request: ExtractRequest = serde_json::from_str(r#"{"youtube_url": "https://y/1"}"#).unwrap();
        let report = request.validate().unwrap_err();
        assert!(report.to_string().contains("persona_name"));
    }

    #[test]
    fn clone_request_accepts_extract_reference_alone() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"persona_name": "Ann", "extract_job_id": "{id}"}}"#);
        let request: CloneRequest = serde_json::from_str(&body).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.extract_job_id, Some(id));
        assert!(request.youtube_url.is_none());
    }

    #[test]
    fn blank_strings_are_absent() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" a ".into())).as_deref(), Some("a"));
        assert_eq!(non_blank(None), None);
    }
}
