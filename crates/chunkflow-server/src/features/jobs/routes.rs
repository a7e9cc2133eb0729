use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::api::response::{ApiResponse, ErrorResponse};
use crate::middleware::auth::AuthenticatedUser;

use super::{
    commands::{CreateJobCommand, CreateJobError},
    queries::{
        GetProgressError, GetProgressQuery, GetStatusError, GetStatusQuery,
    },
    JobsState,
};

pub fn jobs_routes() -> Router<JobsState> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:job_id/status", get(get_status))
        .route("/jobs/:job_id/progress", get(get_progress))
}

#[tracing::instrument(skip(state, multipart), fields(user_id = %user.user_id))]
async fn create_job(
    State(state): State<JobsState>,
    Extension(user): Extension<AuthenticatedUser>,
    mut multipart: Multipart,
) -> Result<Response, JobApiError> {
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| JobApiError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| JobApiError::BadRequest(format!("Failed to read file bytes: {}", e)))?;
        upload = Some((file_name, content_type, data.to_vec()));
    }

    let (file_name, content_type, content) = upload.ok_or_else(|| {
        JobApiError::BadRequest("No file field found in multipart data".to_string())
    })?;

    let command = CreateJobCommand {
        file_name,
        user_id: user.user_id,
        content,
        content_type,
    };

    let response = super::commands::create::handle(&state, command).await?;

    tracing::info!(
        job_id = %response.job_id,
        file_key = %response.file_key,
        "Job accepted via API"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state))]
async fn get_status(
    State(state): State<JobsState>,
    Path(job_id): Path<String>,
) -> Result<Response, JobApiError> {
    let job_id = parse_job_id(&job_id)?;
    let response = super::queries::get_status::handle(&state, GetStatusQuery { job_id }).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state))]
async fn get_progress(
    State(state): State<JobsState>,
    Path(job_id): Path<String>,
) -> Result<Response, JobApiError> {
    let job_id = parse_job_id(&job_id)?;
    let response =
        super::queries::get_progress::handle(&state, GetProgressQuery { job_id }).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

fn parse_job_id(raw: &str) -> Result<Uuid, JobApiError> {
    Uuid::parse_str(raw).map_err(|_| JobApiError::BadRequest(format!("Invalid job id '{}'", raw)))
}

#[derive(Debug)]
enum JobApiError {
    BadRequest(String),
    Create(CreateJobError),
    Status(GetStatusError),
    Progress(GetProgressError),
}

impl From<CreateJobError> for JobApiError {
    fn from(err: CreateJobError) -> Self {
        Self::Create(err)
    }
}

impl From<GetStatusError> for JobApiError {
    fn from(err: GetStatusError) -> Self {
        Self::Status(err)
    }
}

impl From<GetProgressError> for JobApiError {
    fn from(err: GetProgressError) -> Self {
        Self::Progress(err)
    }
}

impl IntoResponse for JobApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            JobApiError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("VALIDATION_ERROR", self.to_string()),
            ),
            JobApiError::Create(e) if e.is_validation() => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("VALIDATION_ERROR", self.to_string()),
            ),
            JobApiError::Create(CreateJobError::Storage(_)) => {
                tracing::error!("Storage error during job creation: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("STORAGE_ERROR", "A storage error occurred"),
                )
            },
            JobApiError::Create(CreateJobError::Persistence(_)) => {
                tracing::error!("Persistence error during job creation: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("DATABASE_ERROR", "A database error occurred"),
                )
            },
            JobApiError::Create(CreateJobError::Cache(_))
            | JobApiError::Status(GetStatusError::Cache(_))
            | JobApiError::Progress(GetProgressError::Cache(_)) => {
                tracing::error!("Cache error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("CACHE_ERROR", "A cache error occurred"),
                )
            },
            JobApiError::Create(CreateJobError::Publish(_))
            | JobApiError::Create(CreateJobError::Encode(_)) => {
                tracing::error!("Publish error during job creation: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("PUBLISH_ERROR", "Failed to announce the job"),
                )
            },
            JobApiError::Create(CreateJobError::Cancelled) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("CANCELLED", "Server is shutting down"),
            ),
            JobApiError::Create(_) => {
                tracing::error!("Job creation failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("INTERNAL_ERROR", "An internal error occurred"),
                )
            },
            JobApiError::Status(GetStatusError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("NOT_FOUND", self.to_string()),
            ),
            JobApiError::Status(GetStatusError::Storage(_)) => {
                tracing::error!("Storage error while signing result URL: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("STORAGE_ERROR", "A storage error occurred"),
                )
            },
        };

        (status, Json(error)).into_response()
    }
}

impl std::fmt::Display for JobApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "{}", msg),
            Self::Create(e) => write!(f, "{}", e),
            Self::Status(e) => write!(f, "{}", e),
            Self::Progress(e) => write!(f, "{}", e),
        }
    }
}
