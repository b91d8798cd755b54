use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::job::{Dispatch, Job, JobInput, SubmittedJob, VoiceJobKind};
use crate::models::persona::{Persona, PersonaDraft};
use crate::models::product::{NewProduct, Product};
use crate::models::user::{User, UserProfile};

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Read a text column holding one of our snake_case enums.
fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unexpected {column} value '{raw}'")))
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        image: row.try_get("image")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    Ok(Job {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        job_type: parse_column(row, "type")?,
        status: parse_column(row, "status")?,
        input: row.try_get("input")?,
        output: row.try_get("output")?,
        error: row.try_get("error")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn persona_from_row(row: &PgRow) -> Result<Persona, StoreError> {
    Ok(Persona {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        source_url: row.try_get("source_url")?,
        voice_status: parse_column(row, "voice_status")?,
        voice_id: row.try_get("voice_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        source_file: row.try_get("source_file")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a job at `pending`. This is the only write the web tier makes
/// to a job row.
async fn insert_job(
    conn: &mut PgConnection,
    job_id: Uuid,
    user_id: Uuid,
    input: &JobInput,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO jobs (id, user_id, type, status, input)
        VALUES ($1, $2, $3, 'pending', $4)
        "#,
    )
    .bind(job_id)
    .bind(user_id)
    .bind(input.job_type().to_string())
    .bind(input.to_value()?)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_outbox(
    conn: &mut PgConnection,
    job_id: Uuid,
    queue: &str,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO job_outbox (job_id, queue) VALUES ($1, $2)")
        .bind(job_id)
        .bind(queue)
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, name, image)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name, image = EXCLUDED.image, updated_at = NOW()
            RETURNING id, email, name, image, created_at, updated_at
            "#,
        )
        .bind(&profile.email)
        .bind(profile.name.as_deref())
        .bind(profile.image.as_deref())
        .fetch_one(&self.pool)
        .await?;

        user_from_row(&row)
    }

    async fn list_products(&self, user_id: Uuid) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, source_file, metadata, created_at
            FROM products
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    async fn find_job(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, type, status, input, output, error,
                   started_at, completed_at, created_at
            FROM jobs
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn find_persona(&self, user_id: Uuid) -> Result<Option<Persona>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, source_url, voice_status, voice_id, created_at, updated_at
            FROM personas
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(persona_from_row).transpose()
    }

    async fn submit_voice_job(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        persona: &PersonaDraft,
        kind: VoiceJobKind,
    ) -> Result<SubmittedJob, StoreError> {
        let mut tx = self.pool.begin().await?;

        // uq_personas_user makes this a single atomic upsert per user.
        let row = sqlx::query(
            r#"
            INSERT INTO personas (user_id, name, source_url, voice_status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (user_id) DO UPDATE
            SET name = EXCLUDED.name,
                source_url = COALESCE(EXCLUDED.source_url, personas.source_url),
                voice_status = CASE WHEN $4::boolean THEN 'pending' ELSE personas.voice_status END,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(&persona.name)
        .bind(persona.source_url.as_deref())
        .bind(persona.reset_voice)
        .fetch_one(&mut *tx)
        .await?;
        let persona_id: Uuid = row.try_get("id")?;

        let input = kind.into_input(persona_id, &persona.name);
        insert_job(&mut *tx, job_id, user_id, &input).await?;
        insert_outbox(&mut *tx, job_id, input.job_type().queue()).await?;

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, user_id, name, description, source_file, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id)
        .bind(user_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.source_file)
        .bind(serde_json::to_value(&product.metadata)?)
        .execute(&mut *tx)
        .await?;

        insert_job(&mut *tx, job_id, user_id, input).await?;
        insert_outbox(&mut *tx, job_id, input.job_type().queue()).await?;

        tx.commit().await?;

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
        let rows = sqlx::query(
            r#"
            SELECT job_id, queue
            FROM job_outbox
            WHERE created_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<Dispatch, StoreError> {
                Ok(Dispatch {
                    job_id: r.try_get("job_id")?,
                    queue: r.try_get("queue")?,
                })
            })
            .collect()
    }

    async fn complete_dispatch(&self, job_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM job_outbox WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn outbox_depth(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS depth FROM job_outbox")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("depth")?)
    }
}
