//! # Matching Service
//!
//! Scores how well a user's declared skills cover a job posting and keeps
//! those scores in `job_match_scores`, recomputing them once they go stale.

use std::collections::HashSet;

use chrono::Duration;
use sea_orm::DatabaseConnection;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::error::RepositoryError;
use crate::models::user::Role;
use crate::models::{job_match_score, job_posting, json_string_list, timestamp_now, user};
use crate::repositories::job::ScoreRecord;
use crate::repositories::{JobRepository, UserRepository};

/// Result of comparing a skill set against one posting.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub score: f64,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
}

/// A posting with the viewer's (fresh) score against it.
#[derive(Debug, Clone)]
pub struct JobRecommendation {
    pub job: job_posting::Model,
    pub score: job_match_score::Model,
}

/// A user with their (fresh) score against one posting.
#[derive(Debug, Clone)]
pub struct JobCandidate {
    pub user: user::Model,
    pub score: job_match_score::Model,
}

fn normalize(skill: &str) -> String {
    skill.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// `100 * (2 * matched_required + matched_preferred) / (2 * |required| + |preferred|)`
///
/// Skills compare case- and whitespace-insensitively. A posting that declares
/// no skills scores 0.
pub fn compute_match(user_skills: &[String], job: &job_posting::Model) -> MatchResult {
    let owned: HashSet<String> = user_skills.iter().map(|skill| normalize(skill)).collect();

    let required = dedupe(job.required_skill_list());
    let preferred = dedupe(job.preferred_skill_list());

    let (matched_required, missing_skills): (Vec<String>, Vec<String>) = required
        .iter()
        .cloned()
        .partition(|skill| owned.contains(&normalize(skill)));
    let matched_preferred: Vec<String> = preferred
        .iter()
        .filter(|skill| owned.contains(&normalize(skill)))
        .cloned()
        .collect();

    let possible = 2 * required.len() + preferred.len();
    let score = if possible == 0 {
        0.0
    } else {
        let earned = 2 * matched_required.len() + matched_preferred.len();
        super::timeline::round_to(100.0 * earned as f64 / possible as f64, 2)
    };

    let mut matched_skills = matched_required;
    matched_skills.extend(matched_preferred);

    MatchResult {
        score,
        matched_skills,
        missing_skills,
    }
}

fn dedupe(skills: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    skills
        .into_iter()
        .filter(|skill| !skill.trim().is_empty())
        .filter(|skill| seen.insert(normalize(skill)))
        .collect()
}

pub struct MatchingService {
    db: DatabaseConnection,
    config: MatchingConfig,
}

impl MatchingService {
    pub fn new(db: DatabaseConnection, config: MatchingConfig) -> Self {
        Self { db, config }
    }

    /// A stored score is stale once the job or the user changed after it was
    /// computed, or once it outlived the TTL.
    pub fn is_stale(
        &self,
        score: &job_match_score::Model,
        job: &job_posting::Model,
        user: &user::Model,
        now: DateTimeWithTimeZone,
    ) -> bool {
        score.computed_at < job.updated_at
            || score.computed_at < user.updated_at
            || score.computed_at < now - Duration::hours(self.config.score_ttl_hours)
    }

    async fn store(
        &self,
        job: &job_posting::Model,
        user: &user::Model,
    ) -> Result<job_match_score::Model, RepositoryError> {
        let result = compute_match(&user.skill_list(), job);
        metrics::counter!("match_scores_computed_total").increment(1);

        JobRepository::new(&self.db)
            .upsert_score(ScoreRecord {
                tenant_id: job.tenant_id,
                job_id: job.id,
                user_id: user.id,
                score: result.score,
                matched_skills: result.matched_skills,
                missing_skills: result.missing_skills,
            })
            .await
    }

    /// Open postings scored for `user`, best first, at or above `min_score`.
    pub async fn recommended_jobs(
        &self,
        user: &user::Model,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<JobRecommendation>, RepositoryError> {
        let repo = JobRepository::new(&self.db);
        let jobs = repo.list_open(user.tenant_id).await?;
        let stored = repo.scores_for_user(user.tenant_id, user.id).await?;
        let now = timestamp_now();

        let mut recommendations = Vec::with_capacity(jobs.len());
        let mut refreshed = 0usize;

        for job in jobs {
            let existing = stored.iter().find(|score| score.job_id == job.id);
            let score = match existing {
                Some(score) if !self.is_stale(score, &job, user, now) => score.clone(),
                _ => {
                    refreshed += 1;
                    self.store(&job, user).await?
                }
            };
            recommendations.push(JobRecommendation { job, score });
        }

        tracing::debug!(
            user_id = %user.id,
            refreshed,
            total = recommendations.len(),
            "Computed job recommendations"
        );

        recommendations.retain(|rec| rec.score.score >= min_score);
        recommendations.sort_by(|a, b| {
            b.score
                .score
                .total_cmp(&a.score.score)
                .then_with(|| b.job.created_at.cmp(&a.job.created_at))
        });
        recommendations.truncate(limit);

        Ok(recommendations)
    }

    /// The tenant's alumni scored against `job`, best first.
    pub async fn candidates_for_job(
        &self,
        job: &job_posting::Model,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<JobCandidate>, RepositoryError> {
        let alumni = UserRepository::new(&self.db)
            .list_by_role(job.tenant_id, Role::Alumni)
            .await?;
        let stored = JobRepository::new(&self.db).scores_for_job(job.id).await?;
        let now = timestamp_now();

        let mut candidates = Vec::with_capacity(alumni.len());
        for user in alumni {
            let existing = stored.iter().find(|score| score.user_id == user.id);
            let score = match existing {
                Some(score) if !self.is_stale(score, job, &user, now) => score.clone(),
                _ => self.store(job, &user).await?,
            };
            candidates.push(JobCandidate { user, score });
        }

        candidates.retain(|candidate| candidate.score.score >= min_score);
        candidates.sort_by(|a, b| {
            b.score
                .score
                .total_cmp(&a.score.score)
                .then_with(|| a.user.name.cmp(&b.user.name))
        });
        candidates.truncate(limit);

        Ok(candidates)
    }

    /// Recomputes every alumni score for `job` regardless of freshness.
    pub async fn refresh_job(&self, job: &job_posting::Model) -> Result<usize, RepositoryError> {
        let alumni = UserRepository::new(&self.db)
            .list_by_role(job.tenant_id, Role::Alumni)
            .await?;

        for user in &alumni {
            self.store(job, user).await?;
        }

        tracing::info!(job_id = %job.id, refreshed = alumni.len(), "Refreshed match scores");
        Ok(alumni.len())
    }
}

/// Matched skills stored with a score.
pub fn matched_skills(score: &job_match_score::Model) -> Vec<String> {
    json_string_list(&score.matched_skills)
}

/// Missing required skills stored with a score.
pub fn missing_skills(score: &job_match_score::Model) -> Vec<String> {
    json_string_list(&score.missing_skills)
}
