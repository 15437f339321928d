use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::scheduled_posts::ScheduledPostEntity,
    value_objects::enums::post_statuses::PostStatus,
};

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledPostDto {
    pub id: Uuid,
    pub video_id: Uuid,
    pub social_account_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: PostStatus,
    pub platform_post_id: Option<String>,
    pub error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ScheduledPostEntity> for ScheduledPostDto {
    fn from(value: ScheduledPostEntity) -> Self {
        Self {
            id: value.id,
            video_id: value.video_id,
            social_account_id: value.social_account_id,
            title: value.title,
            description: value.description,
            scheduled_at: value.scheduled_at,
            status: PostStatus::from_str(&value.status).unwrap_or(PostStatus::Failed),
            platform_post_id: value.platform_post_id,
            error: value.error,
            published_at: value.published_at,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduledPostRequest {
    pub video_id: Uuid,
    pub social_account_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduledPostsQuery {
    pub status: Option<String>,
}

/// What a publish request hands to a platform client.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub title: String,
    pub description: Option<String>,
    pub file_path: String,
    pub mime_type: String,
    /// Short-lived URL the platform can pull the file from.
    pub media_url: String,
}

/// Per-tick summary returned by the cron endpoint and logged by the worker.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PublishSummary {
    pub due: usize,
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stale_failed: usize,
    /// Videos stuck in `processing` that the same pass moved to `failed`.
    pub stale_videos_failed: usize,
}
