use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queues
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HS256 secret shared with the identity provider for session tokens
    pub session_secret: String,

    /// ElevenLabs API key; speech synthesis is unavailable without it
    #[serde(default)]
    pub elevenlabs_api_key: Option<String>,

    #[serde(default = "default_elevenlabs_base_url")]
    pub elevenlabs_base_url: String,

    /// Upper bound on a single synthesis request
    #[serde(default = "default_speech_timeout_secs")]
    pub speech_timeout_secs: u64,

    /// Directory shared with the workers (uploads, extracted audio)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// How often the outbox relay runs
    #[serde(default = "default_dispatch_interval_secs")]
    pub dispatch_interval_secs: u64,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_speech_timeout_secs() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_dispatch_interval_secs() -> u64 {
    5
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn speech_timeout(&self) -> Duration {
        Duration::from_secs(self.speech_timeout_secs)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs.max(1))
    }
}
