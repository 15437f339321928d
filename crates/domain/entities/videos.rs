use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::videos;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = videos)]
pub struct VideoEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub original_filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub duration_seconds: Option<f64>,
    pub status: String,
    pub job_id: Option<String>,
    pub processed_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoEntity {
    /// Path of the file that should be served or published: the processed output when present.
    pub fn playable_path(&self) -> &str {
        self.processed_path.as_deref().unwrap_or(&self.storage_path)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = videos)]
pub struct InsertVideoEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub original_filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub duration_seconds: Option<f64>,
    pub status: String,
}
