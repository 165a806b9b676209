//! # Job Repository
//!
//! Job postings and their stored match scores.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, sea_query::OnConflict,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::job_match_score::{self, Entity as JobMatchScore};
use crate::models::job_posting::{self, Entity as JobPosting, JOB_STATUS_OPEN};
use crate::models::timestamp_now;

#[derive(Debug, Clone)]
pub struct NewJobPosting {
    pub tenant_id: Uuid,
    pub employer_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
}

/// Freshly computed score ready to be stored.
#[derive(Debug, Clone)]
pub struct ScoreRecord {
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub score: f64,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
}

pub struct JobRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> JobRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, job: NewJobPosting) -> Result<job_posting::Model, RepositoryError> {
        let now = timestamp_now();
        job_posting::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(job.tenant_id),
            employer_id: Set(job.employer_id),
            title: Set(job.title),
            description: Set(job.description),
            location: Set(job.location),
            required_skills: Set(json!(job.required_skills)),
            preferred_skills: Set(json!(job.preferred_skills)),
            status: Set(JOB_STATUS_OPEN.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<job_posting::Model>, RepositoryError> {
        JobPosting::find_by_id(job_id)
            .filter(job_posting::Column::TenantId.eq(tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list_open(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<job_posting::Model>, RepositoryError> {
        JobPosting::find()
            .filter(job_posting::Column::TenantId.eq(tenant_id))
            .filter(job_posting::Column::Status.eq(JOB_STATUS_OPEN))
            .order_by_desc(job_posting::Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn set_status(
        &self,
        job: job_posting::Model,
        status: &str,
    ) -> Result<job_posting::Model, RepositoryError> {
        let mut active = job.into_active_model();
        active.status = Set(status.to_string());
        active.updated_at = Set(timestamp_now());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn scores_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<job_match_score::Model>, RepositoryError> {
        JobMatchScore::find()
            .filter(job_match_score::Column::TenantId.eq(tenant_id))
            .filter(job_match_score::Column::UserId.eq(user_id))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn scores_for_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<job_match_score::Model>, RepositoryError> {
        JobMatchScore::find()
            .filter(job_match_score::Column::JobId.eq(job_id))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Inserts or replaces the score for (job, user).
    pub async fn upsert_score(
        &self,
        record: ScoreRecord,
    ) -> Result<job_match_score::Model, RepositoryError> {
        let (job_id, user_id) = (record.job_id, record.user_id);
        let row = job_match_score::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(record.tenant_id),
            job_id: Set(record.job_id),
            user_id: Set(record.user_id),
            score: Set(record.score),
            matched_skills: Set(json!(record.matched_skills)),
            missing_skills: Set(json!(record.missing_skills)),
            computed_at: Set(timestamp_now()),
        };

        JobMatchScore::insert(row)
            .on_conflict(
                OnConflict::columns([
                    job_match_score::Column::JobId,
                    job_match_score::Column::UserId,
                ])
                .update_columns([
                    job_match_score::Column::Score,
                    job_match_score::Column::MatchedSkills,
                    job_match_score::Column::MissingSkills,
                    job_match_score::Column::ComputedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        JobMatchScore::find()
            .filter(job_match_score::Column::JobId.eq(job_id))
            .filter(job_match_score::Column::UserId.eq(user_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .ok_or_else(|| RepositoryError::not_found("Match score"))
    }
}
