use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, dsl::count_star, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain;
use crate::infra::db::postgres::{postgres_connection::PgPoolSquad, schema::scheduled_posts};
use domain::{
    entities::scheduled_posts::{InsertScheduledPostEntity, ScheduledPostEntity},
    repositories::scheduled_posts::ScheduledPostRepository,
    value_objects::{enums::post_statuses::PostStatus, users::PostStatusCounts},
};

pub struct ScheduledPostPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ScheduledPostPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ScheduledPostRepository for ScheduledPostPostgres {
    async fn create(
        &self,
        insert_scheduled_post_entity: InsertScheduledPostEntity,
    ) -> Result<ScheduledPostEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let post = insert_into(scheduled_posts::table)
            .values(&insert_scheduled_post_entity)
            .returning(ScheduledPostEntity::as_returning())
            .get_result::<ScheduledPostEntity>(&mut conn)?;

        Ok(post)
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPostEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let post = scheduled_posts::table
            .filter(scheduled_posts::id.eq(post_id))
            .filter(scheduled_posts::user_id.eq(user_id))
            .select(ScheduledPostEntity::as_select())
            .first::<ScheduledPostEntity>(&mut conn)
            .optional()?;

        Ok(post)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<PostStatus>,
    ) -> Result<Vec<ScheduledPostEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let mut query = scheduled_posts::table
            .filter(scheduled_posts::user_id.eq(user_id))
            .into_boxed();
        if let Some(status) = status {
            query = query.filter(scheduled_posts::status.eq(status.to_string()));
        }

        let results = query
            .order(scheduled_posts::scheduled_at.asc())
            .select(ScheduledPostEntity::as_select())
            .load::<ScheduledPostEntity>(&mut conn)?;

        Ok(results)
    }

    async fn delete_if_scheduled(&self, post_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let deleted = diesel::delete(
            scheduled_posts::table
                .filter(scheduled_posts::id.eq(post_id))
                .filter(scheduled_posts::status.eq(PostStatus::Scheduled.to_string())),
        )
        .execute(&mut conn)?;

        Ok(deleted == 1)
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<ScheduledPostEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = scheduled_posts::table
            .filter(scheduled_posts::status.eq(PostStatus::Scheduled.to_string()))
            .filter(scheduled_posts::scheduled_at.le(now))
            .order(scheduled_posts::scheduled_at.asc())
            .limit(limit)
            .select(ScheduledPostEntity::as_select())
            .load::<ScheduledPostEntity>(&mut conn)?;

        Ok(results)
    }

    async fn claim(&self, post_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(scheduled_posts::table)
            .filter(scheduled_posts::id.eq(post_id))
            .filter(scheduled_posts::status.eq(PostStatus::Scheduled.to_string()))
            .set((
                scheduled_posts::status.eq(PostStatus::Processing.to_string()),
                scheduled_posts::attempted_at.eq(Some(now)),
                scheduled_posts::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(updated == 1)
    }

    async fn mark_published(
        &self,
        post_id: Uuid,
        platform_post_id: &str,
        published_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(scheduled_posts::table)
            .filter(scheduled_posts::id.eq(post_id))
            .filter(scheduled_posts::status.eq(PostStatus::Processing.to_string()))
            .set((
                scheduled_posts::status.eq(PostStatus::Published.to_string()),
                scheduled_posts::platform_post_id.eq(Some(platform_post_id)),
                scheduled_posts::published_at.eq(Some(published_at)),
                scheduled_posts::error.eq::<Option<String>>(None),
                scheduled_posts::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated == 1)
    }

    async fn mark_failed(&self, post_id: Uuid, error: &str) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(scheduled_posts::table)
            .filter(scheduled_posts::id.eq(post_id))
            .filter(scheduled_posts::status.eq(PostStatus::Processing.to_string()))
            .set((
                scheduled_posts::status.eq(PostStatus::Failed.to_string()),
                scheduled_posts::error.eq(Some(error)),
                scheduled_posts::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated == 1)
    }

    async fn fail_stale_processing(
        &self,
        attempted_before: DateTime<Utc>,
        error: &str,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(scheduled_posts::table)
            .filter(scheduled_posts::status.eq(PostStatus::Processing.to_string()))
            .filter(
                scheduled_posts::attempted_at
                    .is_null()
                    .or(scheduled_posts::attempted_at.lt(attempted_before)),
            )
            .set((
                scheduled_posts::status.eq(PostStatus::Failed.to_string()),
                scheduled_posts::error.eq(Some(error)),
                scheduled_posts::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated)
    }

    async fn count_by_status(&self) -> Result<PostStatusCounts> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = scheduled_posts::table
            .group_by(scheduled_posts::status)
            .select((scheduled_posts::status, count_star()))
            .load::<(String, i64)>(&mut conn)?;

        let mut counts = PostStatusCounts::default();
        for (status, total) in rows {
            match PostStatus::from_str(&status) {
                Some(PostStatus::Scheduled) => counts.scheduled = total,
                Some(PostStatus::Processing) => counts.processing = total,
                Some(PostStatus::Published) => counts.published = total,
                Some(PostStatus::Failed) => counts.failed = total,
                None => {}
            }
        }

        Ok(counts)
    }

    async fn has_pending_for_video(&self, video_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let pending = scheduled_posts::table
            .filter(scheduled_posts::video_id.eq(video_id))
            .filter(scheduled_posts::status.eq_any([
                PostStatus::Scheduled.to_string(),
                PostStatus::Processing.to_string(),
            ]))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(pending > 0)
    }

    async fn has_pending_for_account(&self, account_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let pending = scheduled_posts::table
            .filter(scheduled_posts::social_account_id.eq(account_id))
            .filter(scheduled_posts::status.eq_any([
                PostStatus::Scheduled.to_string(),
                PostStatus::Processing.to_string(),
            ]))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(pending > 0)
    }
}
