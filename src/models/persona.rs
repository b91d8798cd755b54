use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Progress of the persona's cloned voice. Set back to `Pending` on every
/// clone submission; the voice worker moves it on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VoiceStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub name: String,
    pub source_url: Option<String>,
    pub voice_status: VoiceStatus,
    pub voice_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written by a voice submission's persona upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaDraft {
    pub name: String,
    /// `None` keeps the stored source URL.
    pub source_url: Option<String>,
    pub reset_voice: bool,
}
