use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::scheduled_posts;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = scheduled_posts)]
pub struct ScheduledPostEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub video_id: Uuid,
    pub social_account_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    pub platform_post_id: Option<String>,
    pub error: Option<String>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scheduled_posts)]
pub struct InsertScheduledPostEntity {
    pub user_id: Uuid,
    pub video_id: Uuid,
    pub social_account_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
}
