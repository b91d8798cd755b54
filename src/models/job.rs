use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Queue consumed by the voice worker (extraction and cloning).
pub const VOICE_QUEUE: &str = "voice_clone";

/// Queue consumed by the document ingestion worker.
pub const RAG_INGEST_QUEUE: &str = "rag_ingest";

/// Kind of asynchronous work a job represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    RagIngest,
    VoiceExtract,
    VoiceClone,
    VoiceCloneFromExtract,
}

impl JobType {
    /// Name of the queue the job id is pushed onto.
    pub fn queue(self) -> &'static str {
        match self {
            JobType::RagIngest => RAG_INGEST_QUEUE,
            JobType::VoiceExtract | JobType::VoiceClone | JobType::VoiceCloneFromExtract => {
                VOICE_QUEUE
            }
        }
    }
}

/// Status of a job. Only the external worker moves a job past `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A job row as stored. `input` and `output` are returned exactly as the
/// datastore holds them; use [`Job::output`] for a normalised view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Build a freshly submitted job at `Pending`.
    pub fn pending(id: Uuid, user_id: Uuid, input: &JobInput) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            user_id,
            job_type: input.job_type(),
            status: JobStatus::Pending,
            input: input.to_value()?,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        })
    }

    pub fn output(&self) -> Result<JobOutput, serde_json::Error> {
        JobOutput::from_stored(self.output.as_ref())
    }

    pub fn input(&self) -> Result<JobInput, serde_json::Error> {
        JobInput::from_stored(self.job_type, &self.input)
    }
}

/// Workers sometimes store payloads as a JSON-encoded string instead of a
/// JSON object. Both forms normalise to the same value.
pub fn normalize_payload(value: &Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(text) => serde_json::from_str(text),
        other => Ok(other.clone()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagIngestInput {
    pub product_id: Uuid,
    pub filename: String,
    pub file_path: String,
}

/// Input for jobs that start from a YouTube source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSourceInput {
    pub persona_id: Uuid,
    pub youtube_url: String,
    pub persona_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneFromExtractInput {
    pub persona_id: Uuid,
    pub persona_name: String,
    pub extract_job_id: Uuid,
    pub audio_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
}

/// Worker input, one schema per job type. The job type lives in its own
/// column, so the stored payload carries no tag.
#[derive(Debug, Clone, PartialEq)]
pub enum JobInput {
    RagIngest(RagIngestInput),
    VoiceExtract(VoiceSourceInput),
    VoiceClone(VoiceSourceInput),
    VoiceCloneFromExtract(CloneFromExtractInput),
}

impl JobInput {
    pub fn job_type(&self) -> JobType {
        match self {
            JobInput::RagIngest(_) => JobType::RagIngest,
            JobInput::VoiceExtract(_) => JobType::VoiceExtract,
            JobInput::VoiceClone(_) => JobType::VoiceClone,
            JobInput::VoiceCloneFromExtract(_) => JobType::VoiceCloneFromExtract,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            JobInput::RagIngest(input) => serde_json::to_value(input),
            JobInput::VoiceExtract(input) | JobInput::VoiceClone(input) => {
                serde_json::to_value(input)
            }
            JobInput::VoiceCloneFromExtract(input) => serde_json::to_value(input),
        }
    }

    pub fn from_stored(job_type: JobType, value: &Value) -> Result<Self, serde_json::Error> {
        let value = normalize_payload(value)?;
        Ok(match job_type {
            JobType::RagIngest => JobInput::RagIngest(serde_json::from_value(value)?),
            JobType::VoiceExtract => JobInput::VoiceExtract(serde_json::from_value(value)?),
            JobType::VoiceClone => JobInput::VoiceClone(serde_json::from_value(value)?),
            JobType::VoiceCloneFromExtract => {
                JobInput::VoiceCloneFromExtract(serde_json::from_value(value)?)
            }
        })
    }
}

/// Worker-authored output. Every field is optional because the worker
/// writes only what its job type produces.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct JobOutput {
    #[serde(default)]
    pub audio_path: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub chunks: Option<u64>,
}

impl JobOutput {
    pub fn from_stored(value: Option<&Value>) -> Result<Self, serde_json::Error> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => match normalize_payload(value)? {
                Value::Null => Ok(Self::default()),
                normalized => serde_json::from_value(normalized),
            },
        }
    }

    /// The identifier or path a completed job of `job_type` produced.
    pub fn produced(&self, job_type: JobType) -> Option<String> {
        match job_type {
            JobType::VoiceExtract => self.audio_path.clone(),
            JobType::VoiceClone | JobType::VoiceCloneFromExtract => self.voice_id.clone(),
            JobType::RagIngest => self.chunks.map(|n| format!("{n} chunks")),
        }
    }
}

/// Voice job as requested by the caller, before the persona id is known.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceJobKind {
    Extract {
        youtube_url: String,
    },
    Clone {
        youtube_url: String,
    },
    CloneFromExtract {
        extract_job_id: Uuid,
        audio_path: String,
        youtube_url: Option<String>,
    },
}

impl VoiceJobKind {
    pub fn job_type(&self) -> JobType {
        match self {
            VoiceJobKind::Extract { .. } => JobType::VoiceExtract,
            VoiceJobKind::Clone { .. } => JobType::VoiceClone,
            VoiceJobKind::CloneFromExtract { .. } => JobType::VoiceCloneFromExtract,
        }
    }

    /// Source URL to record on the persona, if the request carries one.
    pub fn source_url(&self) -> Option<&str> {
        match self {
            VoiceJobKind::Extract { youtube_url } | VoiceJobKind::Clone { youtube_url } => {
                Some(youtube_url)
            }
            VoiceJobKind::CloneFromExtract { youtube_url, .. } => youtube_url.as_deref(),
        }
    }

    /// Cloning replaces the persona's voice, so its status goes back to pending.
    pub fn resets_voice(&self) -> bool {
        !matches!(self, VoiceJobKind::Extract { .. })
    }

    pub fn into_input(self, persona_id: Uuid, persona_name: &str) -> JobInput {
        let persona_name = persona_name.to_string();
        match self {
            VoiceJobKind::Extract { youtube_url } => JobInput::VoiceExtract(VoiceSourceInput {
                persona_id,
                youtube_url,
                persona_name,
            }),
            VoiceJobKind::Clone { youtube_url } => JobInput::VoiceClone(VoiceSourceInput {
                persona_id,
                youtube_url,
                persona_name,
            }),
            VoiceJobKind::CloneFromExtract {
                extract_job_id,
                audio_path,
                youtube_url,
            } => JobInput::VoiceCloneFromExtract(CloneFromExtractInput {
                persona_id,
                persona_name,
                extract_job_id,
                audio_path,
                youtube_url,
            }),
        }
    }
}

/// Identifiers returned once a job and its outbox entry are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedJob {
    pub job_id: Uuid,
    pub persona_id: Option<Uuid>,
}

/// A committed job id still waiting to be pushed onto its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub job_id: Uuid,
    pub queue: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_accepts_object_and_encoded_string() {
        let object = json!({"audio_path": "/data/audio/u/j/clean.wav"});
        let encoded = Value::String(r#"{"audio_path": "/data/audio/u/j/clean.wav"}"#.to_string());

        assert_eq!(normalize_payload(&object).unwrap(), object);
        assert_eq!(normalize_payload(&encoded).unwrap(), object);
    }

    #[test]
    fn output_from_encoded_string_exposes_voice_id() {
        let stored = Value::String(r#"{"voice_id": "abc123"}"#.to_string());
        let output = JobOutput::from_stored(Some(&stored)).unwrap();
        assert_eq!(output.voice_id.as_deref(), Some("abc123"));
        assert_eq!(output.produced(JobType::VoiceClone).as_deref(), Some("abc123"));
        assert_eq!(output.produced(JobType::VoiceExtract), None);
    }

    #[test]
    fn missing_output_is_empty() {
        assert_eq!(JobOutput::from_stored(None).unwrap(), JobOutput::default());
        assert_eq!(
            JobOutput::from_stored(Some(&Value::Null)).unwrap(),
            JobOutput::default()
        );
    }

    #[test]
    fn malformed_encoded_output_is_an_error() {
        let stored = Value::String("not json".to_string());
        assert!(JobOutput::from_stored(Some(&stored)).is_err());
    }

    #[test]
    fn input_is_stored_untagged_and_read_back_by_type() {
        let persona_id = Uuid::new_v4();
        let input = VoiceJobKind::Extract {
            youtube_url: "https://y/1".to_string(),
        }
        .into_input(persona_id, "Ann");

        let value = input.to_value().unwrap();
        assert_eq!(value["youtube_url"], "https://y/1");
        assert_eq!(value["persona_name"], "Ann");
        assert!(value.get("type").is_none());

        let back = JobInput::from_stored(JobType::VoiceExtract, &value).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn voice_jobs_share_a_queue_apart_from_ingestion() {
        assert_eq!(JobType::VoiceExtract.queue(), VOICE_QUEUE);
        assert_eq!(JobType::VoiceCloneFromExtract.queue(), VOICE_QUEUE);
        assert_eq!(JobType::RagIngest.queue(), RAG_INGEST_QUEUE);
        assert_eq!(JobType::VoiceCloneFromExtract.to_string(), "voice_clone_from_extract");
        assert_eq!("rag_ingest".parse::<JobType>().unwrap(), JobType::RagIngest);
    }

    #[test]
    fn only_cloning_resets_the_voice() {
        let extract = VoiceJobKind::Extract {
            youtube_url: "https://y/1".into(),
        };
        let clone = VoiceJobKind::CloneFromExtract {
            extract_job_id: Uuid::new_v4(),
            audio_path: "/a.wav".into(),
            youtube_url: None,
        };
        assert!(!extract.resets_voice());
        assert!(clone.resets_voice());
        assert_eq!(clone.source_url(), None);
    }
}
