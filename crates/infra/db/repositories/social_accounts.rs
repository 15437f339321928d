use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update, upsert::excluded};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain;
use crate::infra::db::postgres::{
    postgres_connection::PgPoolSquad, schema::social_media_accounts,
};
use domain::{
    entities::social_accounts::{SocialAccountEntity, UpsertSocialAccountEntity},
    repositories::social_accounts::SocialAccountRepository,
};

pub struct SocialAccountPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SocialAccountPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SocialAccountRepository for SocialAccountPostgres {
    async fn upsert(
        &self,
        upsert_social_account_entity: UpsertSocialAccountEntity,
    ) -> Result<SocialAccountEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let account = insert_into(social_media_accounts::table)
            .values(&upsert_social_account_entity)
            .on_conflict((
                social_media_accounts::user_id,
                social_media_accounts::platform,
                social_media_accounts::platform_account_id,
            ))
            .do_update()
            .set((
                social_media_accounts::account_name
                    .eq(excluded(social_media_accounts::account_name)),
                social_media_accounts::access_token_encrypted
                    .eq(excluded(social_media_accounts::access_token_encrypted)),
                social_media_accounts::refresh_token_encrypted
                    .eq(excluded(social_media_accounts::refresh_token_encrypted)),
                social_media_accounts::token_expires_at
                    .eq(excluded(social_media_accounts::token_expires_at)),
                social_media_accounts::scopes.eq(excluded(social_media_accounts::scopes)),
                social_media_accounts::updated_at.eq(Utc::now()),
            ))
            .returning(SocialAccountEntity::as_returning())
            .get_result::<SocialAccountEntity>(&mut conn)?;

        Ok(account)
    }

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<SocialAccountEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let account = social_media_accounts::table
            .find(account_id)
            .select(SocialAccountEntity::as_select())
            .first::<SocialAccountEntity>(&mut conn)
            .optional()?;

        Ok(account)
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<SocialAccountEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let account = social_media_accounts::table
            .filter(social_media_accounts::id.eq(account_id))
            .filter(social_media_accounts::user_id.eq(user_id))
            .select(SocialAccountEntity::as_select())
            .first::<SocialAccountEntity>(&mut conn)
            .optional()?;

        Ok(account)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<SocialAccountEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = social_media_accounts::table
            .filter(social_media_accounts::user_id.eq(user_id))
            .order((
                social_media_accounts::platform.asc(),
                social_media_accounts::created_at.asc(),
            ))
            .select(SocialAccountEntity::as_select())
            .load::<SocialAccountEntity>(&mut conn)?;

        Ok(results)
    }

    async fn delete(&self, account_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        diesel::delete(social_media_accounts::table.find(account_id)).execute(&mut conn)?;

        Ok(())
    }

    async fn update_tokens(
        &self,
        account_id: Uuid,
        access_token_encrypted: String,
        refresh_token_encrypted: Option<String>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(social_media_accounts::table.find(account_id))
            .set((
                social_media_accounts::access_token_encrypted.eq(access_token_encrypted),
                social_media_accounts::refresh_token_encrypted.eq(refresh_token_encrypted),
                social_media_accounts::token_expires_at.eq(token_expires_at),
                social_media_accounts::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
