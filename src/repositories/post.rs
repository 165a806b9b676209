//! # Post Repository
//!
//! Posts, engagement counters and the candidate queries behind the timeline
//! and the scheduled-post publisher. Soft-deleted rows are never returned.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect, Set, prelude::DateTimeWithTimeZone,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::post::{self, EngagementKind, Entity as Post, PostStatus, Visibility};
use crate::models::timestamp_now;

#[derive(Debug, Clone)]
pub struct NewPost {
    pub tenant_id: Uuid,
    pub author_id: Uuid,
    pub circle_id: Option<Uuid>,
    pub content: String,
    pub visibility: Visibility,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTimeWithTimeZone>,
    pub published_at: Option<DateTimeWithTimeZone>,
}

/// Bounds for the timeline candidate query.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub tenant_id: Uuid,
    pub viewer_id: Uuid,
    pub circle_ids: Vec<Uuid>,
    /// Oldest `published_at` still inside the ranking window
    pub published_after: DateTimeWithTimeZone,
    /// Instant the ranking is pinned to; later posts wait for a fresh first page
    pub published_before: DateTimeWithTimeZone,
    pub limit: u64,
}

pub struct PostRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> PostRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, new_post: NewPost) -> Result<post::Model, RepositoryError> {
        let now = timestamp_now();
        post::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(new_post.tenant_id),
            author_id: Set(new_post.author_id),
            circle_id: Set(new_post.circle_id),
            content: Set(new_post.content),
            visibility: Set(new_post.visibility.as_str().to_string()),
            status: Set(new_post.status.as_str().to_string()),
            scheduled_at: Set(new_post.scheduled_at),
            published_at: Set(new_post.published_at),
            likes_count: Set(0),
            comments_count: Set(0),
            shares_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find(
        &self,
        tenant_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<post::Model>, RepositoryError> {
        Post::find_by_id(post_id)
            .filter(post::Column::TenantId.eq(tenant_id))
            .filter(post::Column::DeletedAt.is_null())
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn soft_delete(&self, post: post::Model) -> Result<(), RepositoryError> {
        let now = timestamp_now();
        let mut active = post.into_active_model();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }

    /// Atomically bumps the counter matching `kind` and returns the fresh row.
    pub async fn record_engagement(
        &self,
        post: &post::Model,
        kind: EngagementKind,
    ) -> Result<post::Model, RepositoryError> {
        let column = match kind {
            EngagementKind::Like => post::Column::LikesCount,
            EngagementKind::Comment => post::Column::CommentsCount,
            EngagementKind::Share => post::Column::SharesCount,
        };

        Post::update_many()
            .col_expr(column, Expr::col(column).add(1))
            .col_expr(post::Column::UpdatedAt, Expr::value(timestamp_now()))
            .filter(post::Column::Id.eq(post.id))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        self.find(post.tenant_id, post.id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Post"))
    }

    /// Published posts visible to the viewer, newest first: their own posts,
    /// posts in circles they belong to, and public posts.
    pub async fn timeline_candidates(
        &self,
        query: CandidateQuery,
    ) -> Result<Vec<post::Model>, RepositoryError> {
        let mut visible = Condition::any()
            .add(post::Column::AuthorId.eq(query.viewer_id))
            .add(post::Column::Visibility.eq(Visibility::Public.as_str()));

        if !query.circle_ids.is_empty() {
            visible = visible.add(
                Condition::all()
                    .add(post::Column::Visibility.eq(Visibility::Circle.as_str()))
                    .add(post::Column::CircleId.is_in(query.circle_ids)),
            );
        }

        Post::find()
            .filter(post::Column::TenantId.eq(query.tenant_id))
            .filter(post::Column::Status.eq(PostStatus::Published.as_str()))
            .filter(post::Column::DeletedAt.is_null())
            .filter(post::Column::PublishedAt.gte(query.published_after))
            .filter(post::Column::PublishedAt.lte(query.published_before))
            .filter(visible)
            .order_by_desc(post::Column::PublishedAt)
            .order_by_desc(post::Column::Id)
            .limit(query.limit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// The author's published public posts, newest first.
    pub async fn public_by_author(
        &self,
        tenant_id: Uuid,
        author_id: Uuid,
        limit: u64,
    ) -> Result<Vec<post::Model>, RepositoryError> {
        Post::find()
            .filter(post::Column::TenantId.eq(tenant_id))
            .filter(post::Column::AuthorId.eq(author_id))
            .filter(post::Column::Status.eq(PostStatus::Published.as_str()))
            .filter(post::Column::Visibility.eq(Visibility::Public.as_str()))
            .filter(post::Column::DeletedAt.is_null())
            .order_by_desc(post::Column::PublishedAt)
            .order_by_desc(post::Column::Id)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Scheduled posts whose time has come, across all tenants, oldest first.
    pub async fn due_scheduled(
        &self,
        now: DateTimeWithTimeZone,
        batch_size: u64,
    ) -> Result<Vec<post::Model>, RepositoryError> {
        Post::find()
            .filter(post::Column::Status.eq(PostStatus::Scheduled.as_str()))
            .filter(post::Column::DeletedAt.is_null())
            .filter(post::Column::ScheduledAt.lte(now))
            .order_by_asc(post::Column::ScheduledAt)
            .order_by_asc(post::Column::Id)
            .limit(batch_size)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Marks a scheduled post published as of its scheduled time.
    pub async fn publish_scheduled(
        &self,
        post: post::Model,
    ) -> Result<post::Model, RepositoryError> {
        let published_at = post.scheduled_at.unwrap_or_else(timestamp_now);
        let mut active = post.into_active_model();
        active.status = Set(PostStatus::Published.as_str().to_string());
        active.published_at = Set(Some(published_at));
        active.updated_at = Set(timestamp_now());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
