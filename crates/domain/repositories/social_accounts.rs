use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::social_accounts::{SocialAccountEntity, UpsertSocialAccountEntity};

#[automock]
#[async_trait]
pub trait SocialAccountRepository {
    /// Keyed on (user, platform, platform account id); reconnecting replaces the stored tokens.
    async fn upsert(
        &self,
        upsert_social_account_entity: UpsertSocialAccountEntity,
    ) -> Result<SocialAccountEntity>;

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<SocialAccountEntity>>;

    async fn find_for_user(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<SocialAccountEntity>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<SocialAccountEntity>>;

    async fn delete(&self, account_id: Uuid) -> Result<()>;

    async fn update_tokens(
        &self,
        account_id: Uuid,
        access_token_encrypted: String,
        refresh_token_encrypted: Option<String>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}
