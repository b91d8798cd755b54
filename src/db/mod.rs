use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{Dispatch, Job, JobInput, SubmittedJob, VoiceJobKind};
use crate::models::persona::{Persona, PersonaDraft};
use crate::models::product::{NewProduct, Product};
use crate::models::user::{User, UserProfile};

pub mod memory;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Datastore operations used by the web tier.
///
/// Every job read is scoped to the owning user. Submissions write the
/// persona (if any), the job row and its outbox entry atomically.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Insert the user or refresh name and image, keyed by email.
    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, StoreError>;

    /// Products owned by the user, newest first.
    async fn list_products(&self, user_id: Uuid) -> Result<Vec<Product>, StoreError>;

    async fn find_job(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    async fn find_persona(&self, user_id: Uuid) -> Result<Option<Persona>, StoreError>;

    /// Upsert the user's persona and queue a voice job against it.
    async fn submit_voice_job(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        persona: &PersonaDraft,
        kind: VoiceJobKind,
    ) -> Result<SubmittedJob, StoreError>;

    /// Create a product and the ingestion job that processes it.
    async fn submit_product(
        &self,
        user_id: Uuid,
        product: &NewProduct,
        job_id: Uuid,
        input: &JobInput,
    ) -> Result<SubmittedJob, StoreError>;

    /// Outbox entries created at or before `created_before`, oldest first.
    async fn pending_dispatches(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Dispatch>, StoreError>;

    /// Remove the outbox entry once the job id is on its queue.
    async fn complete_dispatch(&self, job_id: Uuid) -> Result<(), StoreError>;

    async fn outbox_depth(&self) -> Result<i64, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}
