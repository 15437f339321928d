use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity},
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};

#[automock]
#[async_trait]
pub trait SubscriptionRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Inserts the user's subscription or overwrites the existing row; usage is kept.
    async fn upsert_for_user(
        &self,
        upsert_subscription_entity: UpsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity>;

    async fn update_from_provider(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        current_period_start: Option<DateTime<Utc>>,
        current_period_end: Option<DateTime<Utc>>,
        cancel_at_period_end: bool,
    ) -> Result<Option<SubscriptionEntity>>;

    async fn update_status_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Sets `minutes_used` back to zero for a new billing period.
    async fn reset_usage_by_stripe_subscription_id(&self, stripe_subscription_id: &str)
    -> Result<()>;

    async fn mark_cancel_at_period_end(&self, user_id: Uuid) -> Result<()>;

    async fn add_minutes_used(&self, user_id: Uuid, minutes: i32) -> Result<()>;

    async fn count_active(&self) -> Result<i64>;
}
