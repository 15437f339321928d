use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::social_media_accounts;

/// A connected platform account. Token columns hold ciphertext only.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = social_media_accounts)]
pub struct SocialAccountEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    pub platform_account_id: String,
    pub account_name: Option<String>,
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = social_media_accounts)]
pub struct UpsertSocialAccountEntity {
    pub user_id: Uuid,
    pub platform: String,
    pub platform_account_id: String,
    pub account_name: Option<String>,
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
}
