use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::users::{InsertUserEntity, UserEntity},
    value_objects::enums::user_roles::UserRole,
};

#[automock]
#[async_trait]
pub trait UserRepository {
    async fn create(&self, insert_user_entity: InsertUserEntity) -> Result<UserEntity>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>>;

    async fn find_by_stripe_customer_id(&self, customer_id: &str) -> Result<Option<UserEntity>>;

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<UserEntity>>;

    async fn count(&self) -> Result<i64>;

    async fn count_by_role(&self, role: UserRole) -> Result<i64>;

    async fn update_role(&self, user_id: Uuid, role: UserRole) -> Result<UserEntity>;

    async fn delete(&self, user_id: Uuid) -> Result<()>;

    async fn set_stripe_customer_id(&self, user_id: Uuid, customer_id: &str) -> Result<()>;

    async fn set_subscribed(&self, user_id: Uuid, is_subscribed: bool) -> Result<()>;
}
