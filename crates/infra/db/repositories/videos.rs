use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain;
use crate::infra::db::postgres::{postgres_connection::PgPoolSquad, schema::videos};
use domain::{
    entities::videos::{InsertVideoEntity, VideoEntity},
    repositories::videos::VideoRepository,
    value_objects::{enums::video_statuses::VideoStatus, videos::ProcessedVideo},
};

pub struct VideoPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl VideoPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl VideoRepository for VideoPostgres {
    async fn create(&self, insert_video_entity: InsertVideoEntity) -> Result<VideoEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let video = insert_into(videos::table)
            .values(&insert_video_entity)
            .returning(VideoEntity::as_returning())
            .get_result::<VideoEntity>(&mut conn)?;

        Ok(video)
    }

    async fn find_by_id(&self, video_id: Uuid) -> Result<Option<VideoEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let video = videos::table
            .find(video_id)
            .select(VideoEntity::as_select())
            .first::<VideoEntity>(&mut conn)
            .optional()?;

        Ok(video)
    }

    async fn find_for_user(&self, user_id: Uuid, video_id: Uuid) -> Result<Option<VideoEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let video = videos::table
            .filter(videos::id.eq(video_id))
            .filter(videos::user_id.eq(user_id))
            .select(VideoEntity::as_select())
            .first::<VideoEntity>(&mut conn)
            .optional()?;

        Ok(video)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<VideoEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = videos::table
            .filter(videos::user_id.eq(user_id))
            .order(videos::created_at.desc())
            .select(VideoEntity::as_select())
            .load::<VideoEntity>(&mut conn)?;

        Ok(results)
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let total = videos::table
            .filter(videos::user_id.eq(user_id))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(total)
    }

    async fn count_all(&self) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let total = videos::table.count().get_result::<i64>(&mut conn)?;

        Ok(total)
    }

    async fn delete(&self, video_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        diesel::delete(videos::table.find(video_id)).execute(&mut conn)?;

        Ok(())
    }

    async fn mark_processing(&self, video_id: Uuid, job_id: &str) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(videos::table)
            .filter(videos::id.eq(video_id))
            .filter(videos::status.ne(VideoStatus::Processing.to_string()))
            .set((
                videos::status.eq(VideoStatus::Processing.to_string()),
                videos::job_id.eq(Some(job_id)),
                videos::error.eq::<Option<String>>(None),
                videos::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated == 1)
    }

    async fn mark_ready(&self, video_id: Uuid, processed: ProcessedVideo) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(videos::table.find(video_id))
            .set((
                videos::status.eq(VideoStatus::Ready.to_string()),
                videos::processed_path.eq(Some(processed.output_path)),
                videos::thumbnail_path.eq(processed.thumbnail_path),
                videos::duration_seconds.eq(Some(processed.duration_seconds)),
                videos::error.eq::<Option<String>>(None),
                videos::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_failed(&self, video_id: Uuid, error: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(videos::table.find(video_id))
            .set((
                videos::status.eq(VideoStatus::Failed.to_string()),
                videos::error.eq(Some(error)),
                videos::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn fail_stale_processing(
        &self,
        updated_before: DateTime<Utc>,
        error: &str,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(videos::table)
            .filter(videos::status.eq(VideoStatus::Processing.to_string()))
            .filter(videos::updated_at.lt(updated_before))
            .set((
                videos::status.eq(VideoStatus::Failed.to_string()),
                videos::error.eq(Some(error)),
                videos::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated)
    }
}
