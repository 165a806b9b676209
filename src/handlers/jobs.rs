//! # Job Handlers
//!
//! Job postings, recommendations for alumni and candidate lists for
//! employers, all backed by the stored match scores.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::types::{DataResponse, JobResponse, MatchScoreResponse, UserResponse};
use crate::auth::{AuthUser, require_role};
use crate::error::{ApiError, FieldErrors, forbidden, not_found};
use crate::models::job_posting::{self, JOB_STATUS_CLOSED};
use crate::models::user::{self, Role};
use crate::repositories::JobRepository;
use crate::repositories::job::NewJobPosting;
use crate::repositories::user::normalize_skills;
use crate::server::AppState;
use crate::services::webhooks::EVENT_JOB_POSTED;
use crate::tenancy::{CurrentTenant, TenantHeader};

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 10_000;
const MAX_DECLARED_SKILLS: usize = 30;
const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    #[schema(example = "Backend Engineer")]
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub preferred_skills: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MatchQuery {
    /// Minimum score, 0-100 (default: 0)
    pub min_score: Option<f64>,
    /// Maximum results (default: 20, max: 100)
    pub limit: Option<i64>,
}

impl MatchQuery {
    fn validated(&self) -> Result<(f64, usize), ApiError> {
        let mut errors = FieldErrors::new();
        let min_score = self.min_score.unwrap_or(0.0);
        if !min_score.is_finite() || !(0.0..=100.0).contains(&min_score) {
            errors.add("min_score", "The min_score must be between 0 and 100.");
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            errors.add("limit", format!("The limit must be between 1 and {MAX_LIMIT}."));
        }
        errors.finish()?;
        Ok((min_score, limit as usize))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecommendedJob {
    pub job: JobResponse,
    #[serde(rename = "match")]
    pub match_score: MatchScoreResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobCandidateResponse {
    pub user: UserResponse,
    #[serde(rename = "match")]
    pub match_score: MatchScoreResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub refreshed: usize,
}

async fn find_job(
    state: &AppState,
    tenant_id: Uuid,
    job_id: Uuid,
) -> Result<job_posting::Model, ApiError> {
    JobRepository::new(&state.db)
        .find(tenant_id, job_id)
        .await?
        .ok_or_else(|| not_found("Job"))
}

/// The posting's employer or an admin.
fn require_job_owner(job: &job_posting::Model, user: &user::Model) -> Result<(), ApiError> {
    if job.employer_id == user.id || user.role() == Role::Admin {
        Ok(())
    } else {
        Err(forbidden(Some("Only the posting employer or an admin may do this")))
    }
}

/// Publishes a job posting (employers and admins)
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created", body = DataResponse<JobResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Not an employer or admin", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<JobResponse>>), ApiError> {
    require_role(&auth.user, &[Role::Employer, Role::Admin])?;
    let Json(request) = body?;

    let mut errors = FieldErrors::new();
    let title_len = request.title.trim().chars().count();
    if title_len == 0 || title_len > MAX_TITLE_CHARS {
        errors.add(
            "title",
            format!("The title must be between 1 and {MAX_TITLE_CHARS} characters."),
        );
    }
    if request.description.chars().count() > MAX_DESCRIPTION_CHARS {
        errors.add(
            "description",
            format!("The description may not be greater than {MAX_DESCRIPTION_CHARS} characters."),
        );
    }
    for (field, skills) in [
        ("required_skills", &request.required_skills),
        ("preferred_skills", &request.preferred_skills),
    ] {
        if skills.len() > MAX_DECLARED_SKILLS {
            errors.add(field, format!("No more than {MAX_DECLARED_SKILLS} skills may be listed."));
        }
    }
    errors.finish()?;

    let job = JobRepository::new(&state.db)
        .create(NewJobPosting {
            tenant_id: tenant.id,
            employer_id: auth.user.id,
            title: request.title.trim().to_string(),
            description: request.description,
            location: request.location,
            required_skills: normalize_skills(&request.required_skills),
            preferred_skills: normalize_skills(&request.preferred_skills),
        })
        .await?;

    state.webhooks.dispatch(
        tenant,
        EVENT_JOB_POSTED,
        json!({ "job_id": job.id, "title": job.title, "employer_id": job.employer_id }),
    );

    Ok((StatusCode::CREATED, Json(DataResponse::new(job.into()))))
}

/// Open job postings of the tenant, newest first
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Open jobs", body = DataResponse<Vec<JobResponse>>),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(_auth): AuthUser,
) -> Result<Json<DataResponse<Vec<JobResponse>>>, ApiError> {
    let jobs = JobRepository::new(&state.db).list_open(tenant.id).await?;
    Ok(Json(DataResponse::new(
        jobs.into_iter().map(JobResponse::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "The job", body = DataResponse<JobResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(_auth): AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DataResponse<JobResponse>>, ApiError> {
    let job = find_job(&state, tenant.id, job_id).await?;
    Ok(Json(DataResponse::new(job.into())))
}

/// Closes a posting so it no longer appears in recommendations
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/close",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job closed", body = DataResponse<JobResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Not the posting employer or an admin", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn close_job(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DataResponse<JobResponse>>, ApiError> {
    let job = find_job(&state, tenant.id, job_id).await?;
    require_job_owner(&job, &auth.user)?;

    let job = JobRepository::new(&state.db)
        .set_status(job, JOB_STATUS_CLOSED)
        .await?;
    Ok(Json(DataResponse::new(job.into())))
}

/// Open jobs ranked by how well they match the current user's skills
#[utoipa::path(
    get,
    path = "/api/v1/jobs/recommended",
    security(("bearer_auth" = [])),
    params(TenantHeader, MatchQuery),
    responses(
        (status = 200, description = "Recommended jobs, best match first", body = DataResponse<Vec<RecommendedJob>>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 422, description = "Invalid query", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn recommended_jobs(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Query(query): Query<MatchQuery>,
) -> Result<Json<DataResponse<Vec<RecommendedJob>>>, ApiError> {
    let (min_score, limit) = query.validated()?;

    let recommendations = state
        .matching
        .recommended_jobs(&auth.user, min_score, limit)
        .await?;

    Ok(Json(DataResponse::new(
        recommendations
            .into_iter()
            .map(|rec| RecommendedJob {
                match_score: MatchScoreResponse::from(&rec.score),
                job: rec.job.into(),
            })
            .collect(),
    )))
}

/// Alumni ranked against a posting (posting employer or admin)
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/candidates",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Job ID"), MatchQuery),
    responses(
        (status = 200, description = "Candidates, best match first", body = DataResponse<Vec<JobCandidateResponse>>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Not the posting employer or an admin", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn job_candidates(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(job_id): Path<Uuid>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<DataResponse<Vec<JobCandidateResponse>>>, ApiError> {
    let (min_score, limit) = query.validated()?;
    let job = find_job(&state, tenant.id, job_id).await?;
    require_job_owner(&job, &auth.user)?;

    let candidates = state
        .matching
        .candidates_for_job(&job, min_score, limit)
        .await?;

    Ok(Json(DataResponse::new(
        candidates
            .into_iter()
            .map(|candidate| JobCandidateResponse {
                match_score: MatchScoreResponse::from(&candidate.score),
                user: candidate.user.into(),
            })
            .collect(),
    )))
}

/// Recomputes every alumni score for a posting
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/refresh-matches",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Scores recomputed", body = DataResponse<RefreshResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Not the posting employer or an admin", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn refresh_matches(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DataResponse<RefreshResponse>>, ApiError> {
    let job = find_job(&state, tenant.id, job_id).await?;
    require_job_owner(&job, &auth.user)?;

    let refreshed = state.matching.refresh_job(&job).await?;
    Ok(Json(DataResponse::new(RefreshResponse { refreshed })))
}
