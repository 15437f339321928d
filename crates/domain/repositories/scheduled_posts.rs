use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::scheduled_posts::{InsertScheduledPostEntity, ScheduledPostEntity},
    value_objects::{enums::post_statuses::PostStatus, users::PostStatusCounts},
};

/// Status writes are conditional on the current status so that a post can only move forward.
#[automock]
#[async_trait]
pub trait ScheduledPostRepository {
    async fn create(
        &self,
        insert_scheduled_post_entity: InsertScheduledPostEntity,
    ) -> Result<ScheduledPostEntity>;

    async fn find_for_user(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPostEntity>>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<PostStatus>,
    ) -> Result<Vec<ScheduledPostEntity>>;

    /// Deletes the post only while it is still `SCHEDULED`.
    async fn delete_if_scheduled(&self, post_id: Uuid) -> Result<bool>;

    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<ScheduledPostEntity>>;

    /// `SCHEDULED -> PROCESSING`. False when another run claimed the post first.
    async fn claim(&self, post_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// `PROCESSING -> PUBLISHED`.
    async fn mark_published(
        &self,
        post_id: Uuid,
        platform_post_id: &str,
        published_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// `PROCESSING -> FAILED`.
    async fn mark_failed(&self, post_id: Uuid, error: &str) -> Result<bool>;

    /// Fails every `PROCESSING` post whose attempt started before `attempted_before`.
    async fn fail_stale_processing(
        &self,
        attempted_before: DateTime<Utc>,
        error: &str,
    ) -> Result<usize>;

    async fn count_by_status(&self) -> Result<PostStatusCounts>;

    async fn has_pending_for_video(&self, video_id: Uuid) -> Result<bool>;

    async fn has_pending_for_account(&self, account_id: Uuid) -> Result<bool>;
}
