use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::videos::{InsertVideoEntity, VideoEntity},
    value_objects::videos::ProcessedVideo,
};

#[automock]
#[async_trait]
pub trait VideoRepository {
    async fn create(&self, insert_video_entity: InsertVideoEntity) -> Result<VideoEntity>;

    async fn find_by_id(&self, video_id: Uuid) -> Result<Option<VideoEntity>>;

    async fn find_for_user(&self, user_id: Uuid, video_id: Uuid) -> Result<Option<VideoEntity>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<VideoEntity>>;

    async fn count_for_user(&self, user_id: Uuid) -> Result<i64>;

    async fn count_all(&self) -> Result<i64>;

    async fn delete(&self, video_id: Uuid) -> Result<()>;

    /// Moves the video to `processing` unless a job is already running. Returns false when it was.
    async fn mark_processing(&self, video_id: Uuid, job_id: &str) -> Result<bool>;

    async fn mark_ready(&self, video_id: Uuid, processed: ProcessedVideo) -> Result<()>;

    async fn mark_failed(&self, video_id: Uuid, error: &str) -> Result<()>;

    /// Fails every `processing` video not touched since `updated_before`. Returns how many moved.
    async fn fail_stale_processing(
        &self,
        updated_before: DateTime<Utc>,
        error: &str,
    ) -> Result<usize>;
}
