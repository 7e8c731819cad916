//! Postgres-backed job and image stores.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `DuplicateKey` |
//! | Database (other) | any | `Unavailable` |
//! | PoolClosed, Io, Tls, timeouts | n/a | `Unavailable` |
//!
//! Rows are decoded through the shared item layouts; a row that does not
//! decode is reported as `Corrupt`.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::instrument;

use mediaconv_core::{ImageId, JobId};
use mediaconv_images::ProcessedImage;
use mediaconv_jobs::Job;

use super::record::{ImageItem, JobItem};
use super::{ImageStore, JobStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Open a connection pool.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    PgPool::connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Apply the `jobs` / `images` schema. Idempotent.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobItem>(
            r#"
            SELECT id, type, status, attempts, input, errors, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_job", e))?;

        row.map(JobItem::into_job).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id(), status = %job.status()), err)]
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let item = JobItem::from_job(job)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, type, status, attempts, input, errors, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET
                type = EXCLUDED.type,
                status = EXCLUDED.status,
                attempts = EXCLUDED.attempts,
                input = EXCLUDED.input,
                errors = EXCLUDED.errors,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(item.id)
        .bind(&item.job_type)
        .bind(&item.status)
        .bind(item.attempts)
        .bind(&item.input)
        .bind(&item.errors)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_job", e))?;

        Ok(())
    }

    #[instrument(
        skip(self, job, observed),
        fields(job_id = %job.id(), observed = %observed.status(), status = %job.status()),
        err
    )]
    async fn save_if_unchanged(&self, job: &Job, observed: &Job) -> Result<(), StoreError> {
        let item = JobItem::from_job(job)?;
        let expected = JobItem::from_job(observed)?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                attempts = $3,
                input = $4,
                errors = $5,
                updated_at = $6
            WHERE id = $1
              AND status = $7
              AND attempts = $8
              AND errors = $9
              AND updated_at = $10
            "#,
        )
        .bind(item.id)
        .bind(&item.status)
        .bind(item.attempts)
        .bind(&item.input)
        .bind(&item.errors)
        .bind(item.updated_at)
        .bind(&expected.status)
        .bind(expected.attempts)
        .bind(&expected.errors)
        .bind(expected.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_job_if_unchanged", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                key: job.id().to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresImageStore {
    pool: Arc<PgPool>,
}

impl PostgresImageStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl ImageStore for PostgresImageStore {
    #[instrument(skip(self), fields(image_id = %id), err)]
    async fn find_by_id(&self, id: ImageId) -> Result<Option<ProcessedImage>, StoreError> {
        let row = sqlx::query_as::<_, ImageItem>(
            r#"
            SELECT id, url, prompt, result_text, result_vendor, result_raw, created_at, updated_at
            FROM images
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_image", e))?;

        row.map(ImageItem::into_image).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_url(&self, url: &str) -> Result<Option<ProcessedImage>, StoreError> {
        let row = sqlx::query_as::<_, ImageItem>(
            r#"
            SELECT id, url, prompt, result_text, result_vendor, result_raw, created_at, updated_at
            FROM images
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_image_by_url", e))?;

        row.map(ImageItem::into_image).transpose()
    }

    #[instrument(skip(self, image), fields(image_id = %image.id(), url = %image.url()), err)]
    async fn save(&self, image: &ProcessedImage) -> Result<(), StoreError> {
        let item = ImageItem::from_image(image)?;

        sqlx::query(
            r#"
            INSERT INTO images (
                id, url, prompt, result_text, result_vendor, result_raw, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET
                url = EXCLUDED.url,
                prompt = EXCLUDED.prompt,
                result_text = EXCLUDED.result_text,
                result_vendor = EXCLUDED.result_vendor,
                result_raw = EXCLUDED.result_raw,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(item.id)
        .bind(&item.url)
        .bind(&item.prompt)
        .bind(&item.result_text)
        .bind(&item.result_vendor)
        .bind(&item.result_raw)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| match e {
            e if is_unique_violation(&e) => StoreError::DuplicateKey(format!("url={}", item.url)),
            e => map_sqlx_error("save_image", e),
        })?;

        Ok(())
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::DuplicateKey(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { index, source } => StoreError::Corrupt {
            key: operation.to_string(),
            reason: format!("column {index}: {source}"),
        },
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
