//! Job management HTTP handlers.
//!
//! This module implements the job endpoints:
//! - POST /api/v1/jobs - Create a job
//! - GET /api/v1/jobs - List the user's jobs, newest first
//! - GET /api/v1/jobs/:id - Get one job
//! - PUT /api/v1/jobs/:id - Replace a job's fields
//! - DELETE /api/v1/jobs/:id - Delete a job

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    extract::{AppJson, AppPath},
    middleware::auth::AuthContext,
    models::job::{Job, JobRequest},
};

const JOB_COLUMNS: &str = "id, user_id, title, client_name, site_address, description, status, \
     quote_pence, created_at, updated_at";

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Create a new job.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Kitchen extension",
///   "client_name": "Mrs Patel",       // optional
///   "site_address": "12 High St",     // optional
///   "description": "Single storey",   // optional
///   "status": "quoted",               // optional, defaults to quoted
///   "quote_pence": 2500000            // optional, defaults to 0
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the created job
/// - **Error (400)**: missing title, unknown status or negative quote
pub async fn create_job(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppJson(request): AppJson<JobRequest>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    request.validate().map_err(AppError::InvalidRequest)?;

    let job = sqlx::query_as::<_, Job>(&format!(
        r#"
        INSERT INTO jobs (user_id, title, client_name, site_address, description, status, quote_pence)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(auth.user_id())
    .bind(request.title.trim())
    .bind(trimmed(request.client_name))
    .bind(trimmed(request.site_address))
    .bind(trimmed(request.description))
    .bind(&request.status)
    .bind(request.quote_pence)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_jobs(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Job>>, AppError> {
    let jobs = sqlx::query_as::<_, Job>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(auth.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(jobs))
}

/// Get a specific job by ID.
///
/// # Security Note
///
/// The query filters by both `id` and `user_id`; another user's job is
/// reported as 404, exactly like a job that does not exist.
pub async fn get_job(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppPath(job_id): AppPath<Uuid>,
) -> Result<Json<Job>, AppError> {
    let job = sqlx::query_as::<_, Job>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND user_id = $2"
    ))
    .bind(job_id)
    .bind(auth.user_id())
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Job"))?;

    Ok(Json(job))
}

pub async fn update_job(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppPath(job_id): AppPath<Uuid>,
    AppJson(request): AppJson<JobRequest>,
) -> Result<Json<Job>, AppError> {
    request.validate().map_err(AppError::InvalidRequest)?;

    let job = sqlx::query_as::<_, Job>(&format!(
        r#"
        UPDATE jobs
        SET title = $3,
            client_name = $4,
            site_address = $5,
            description = $6,
            status = $7,
            quote_pence = $8,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(auth.user_id())
    .bind(request.title.trim())
    .bind(trimmed(request.client_name))
    .bind(trimmed(request.site_address))
    .bind(trimmed(request.description))
    .bind(&request.status)
    .bind(request.quote_pence)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Job"))?;

    Ok(Json(job))
}

/// Delete a job. Invoices and conversations that referenced it keep their
/// data with `job_id` cleared.
pub async fn delete_job(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppPath(job_id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = sqlx::query("DELETE FROM jobs WHERE id = $1 AND user_id = $2")
        .bind(job_id)
        .bind(auth.user_id())
        .execute(&pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("Job"));
    }

    Ok(StatusCode::NO_CONTENT)
}
