//! In-process [`Store`] for tests and local runs without PostgreSQL.
//!
//! Mirrors the constraints the migrations enforce: unique user email, one
//! persona per user, and all-or-nothing submissions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::job::{Dispatch, Job, JobInput, SubmittedJob, VoiceJobKind};
use crate::models::persona::{Persona, PersonaDraft, VoiceStatus};
use crate::models::product::{NewProduct, Product};
use crate::models::user::{User, UserProfile};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    personas: HashMap<Uuid, Persona>,
    /// Products with the owning user, in insertion order.
    products: Vec<(Uuid, Product)>,
    jobs: Vec<Job>,
    outbox: Vec<(Dispatch, DateTime<Utc>)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job row as-is, e.g. one the worker has already advanced.
    pub async fn insert_job(&self, job: Job) {
        self.tables.lock().await.jobs.push(job);
    }

    /// Record a voice id the way the voice worker does on completion.
    pub async fn set_persona_voice(&self, user_id: Uuid, voice_id: &str) {
        if let Some(persona) = self.tables.lock().await.personas.get_mut(&user_id) {
            persona.voice_id = Some(voice_id.to_string());
            persona.voice_status = VoiceStatus::Ready;
        }
    }

    pub async fn jobs_for(&self, user_id: Uuid) -> Vec<Job> {
        let tables = self.tables.lock().await;
        tables
            .jobs
            .iter()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn job_count(&self) -> usize {
        self.tables.lock().await.jobs.len()
    }

    pub async fn persona_count(&self, user_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables
            .personas
            .values()
            .filter(|p| p.user_id == user_id)
            .count()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn user_by_email(&self, email: &str) -> Option<User> {
        self.tables.lock().await.users.get(email).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let user = tables
            .users
            .entry(profile.email.clone())
            .and_modify(|u| {
                u.name = profile.name.clone();
                u.image = profile.image.clone();
                u.updated_at = now;
            })
            .or_insert_with(|| User {
                id: Uuid::new_v4(),
                email: profile.email.clone(),
                name: profile.name.clone(),
                image: profile.image.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(user.clone())
    }

    async fn list_products(&self, user_id: Uuid) -> Result<Vec<Product>, StoreError> {
        let tables = self.tables.lock().await;
        // Newest first; later inserts win ties on created_at.
        let mut products: Vec<(usize, &Product)> = tables
            .products
            .iter()
            .enumerate()
            .filter(|(_, (owner, _))| *owner == user_id)
            .map(|(seq, (_, product))| (seq, product))
            .collect();
        products.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at).then(b.0.cmp(&a.0)));
        Ok(products.into_iter().map(|(_, p)| p.clone()).collect())
    }

    async fn find_job(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .jobs
            .iter()
            .find(|j| j.id == job_id && j.user_id == user_id)
            .cloned())
    }

    async fn find_persona(&self, user_id: Uuid) -> Result<Option<Persona>, StoreError> {
        Ok(self.tables.lock().await.personas.get(&user_id).cloned())
    }

    async fn submit_voice_job(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        persona: &PersonaDraft,
        kind: VoiceJobKind,
    ) -> Result<SubmittedJob, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        // Build everything fallible before touching the tables.
        let persona_id = tables
            .personas
            .get(&user_id)
            .map(|p| p.id)
            .unwrap_or_else(Uuid::new_v4);
        let input = kind.into_input(persona_id, &persona.name);
        let job = Job::pending(job_id, user_id, &input)?;

        let row = tables.personas.entry(user_id).or_insert_with(|| Persona {
            id: persona_id,
            user_id,
            name: persona.name.clone(),
            source_url: None,
            voice_status: VoiceStatus::Pending,
            voice_id: None,
            created_at: now,
            updated_at: now,
        });
        row.name = persona.name.clone();
        if let Some(url) = &persona.source_url {
            row.source_url = Some(url.clone());
        }
        if persona.reset_voice {
            row.voice_status = VoiceStatus::Pending;
        }
        row.updated_at = now;

        tables.outbox.push((
            Dispatch {
                job_id,
                queue: job.job_type.queue().to_string(),
            },
            now,
        ));
        tables.jobs.push(job);

        Ok(SubmittedJob {
            job_id,
            persona_id: Some(persona_id),
        })
    }

    async fn submit_product(
        &self,
        user_id: Uuid,
        product: &NewProduct,
        job_id: Uuid,
        input: &JobInput,
    ) -> Result<SubmittedJob, StoreError> {
        let job = Job::pending(job_id, user_id, input)?;
        let metadata = serde_json::to_value(&product.metadata)?;
        let now = Utc::now();

        let mut tables = self.tables.lock().await;
        tables.products.push((
            user_id,
            Product {
                id: product.id,
                name: product.name.clone(),
                description: product.description.clone(),
                source_file: product.source_file.clone(),
                metadata,
                created_at: now,
            },
        ));
        tables.outbox.push((
            Dispatch {
                job_id,
                queue: job.job_type.queue().to_string(),
            },
            now,
        ));
        tables.jobs.push(job);

        Ok(SubmittedJob {
            job_id,
            persona_id: None,
        })
    }

    async fn pending_dispatches(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Dispatch>, StoreError> {
        let tables = self.tables.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(tables
            .outbox
            .iter()
            .filter(|(_, created_at)| *created_at <= created_before)
            .take(limit)
            .map(|(dispatch, _)| dispatch.clone())
            .collect())
    }

    async fn complete_dispatch(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .outbox
            .retain(|(dispatch, _)| dispatch.job_id != job_id);
        Ok(())
    }

    async fn outbox_depth(&self) -> Result<i64, StoreError> {
        Ok(self.tables.lock().await.outbox.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, url: Option<&str>) -> PersonaDraft {
        PersonaDraft {
            name: name.to_string(),
            source_url: url.map(str::to_string),
            reset_voice: true,
        }
    }

    #[tokio::test]
    async fn persona_upsert_keeps_one_row_per_user() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();

        let first = store
            .submit_voice_job(
                user_id,
                Uuid::new_v4(),
                &draft("Ann", Some("https://y/1")),
                VoiceJobKind::Clone {
                    youtube_url: "https://y/1".into(),
                },
            )
            .await
            .unwrap();
        let second = store
            .submit_voice_job(
                user_id,
                Uuid::new_v4(),
                &draft("Bea", Some("https://y/2")),
                VoiceJobKind::Clone {
                    youtube_url: "https://y/2".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(first.persona_id, second.persona_id);
        assert_eq!(store.persona_count(user_id).await, 1);
        let persona = store.find_persona(user_id).await.unwrap().unwrap();
        assert_eq!(persona.name, "Bea");
        assert_eq!(persona.source_url.as_deref(), Some("https://y/2"));
        assert_eq!(store.outbox_depth().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn clone_submission_resets_a_ready_voice() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let kind = VoiceJobKind::Clone {
            youtube_url: "https://y/1".into(),
        };

        store
            .submit_voice_job(user_id, Uuid::new_v4(), &draft("Ann", None), kind.clone())
            .await
            .unwrap();
        store.set_persona_voice(user_id, "voice-1").await;
        store
            .submit_voice_job(user_id, Uuid::new_v4(), &draft("Ann", None), kind)
            .await
            .unwrap();

        let persona = store.find_persona(user_id).await.unwrap().unwrap();
        assert_eq!(persona.voice_status, VoiceStatus::Pending);
        assert_eq!(persona.voice_id.as_deref(), Some("voice-1"));
    }

    #[tokio::test]
    async fn upsert_user_is_keyed_by_email() {
        let store = MemoryStore::new();
        let profile = UserProfile {
            email: "ann@example.com".into(),
            name: Some("Ann".into()),
            image: None,
        };
        let first = store.upsert_user(&profile).await.unwrap();
        let renamed = UserProfile {
            name: Some("Ann B".into()),
            ..profile
        };
        let second = store.upsert_user(&renamed).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Ann B"));
        assert_eq!(store.user_count().await, 1);
    }
}
