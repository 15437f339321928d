use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::plans::{InsertPlanEntity, PlanEntity};

#[automock]
#[async_trait]
pub trait PlanRepository {
    async fn list_active_plans(&self) -> Result<Vec<PlanEntity>>;

    async fn list_all_plans(&self) -> Result<Vec<PlanEntity>>;

    async fn find_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>>;

    async fn find_by_stripe_price_id(&self, price_id: &str) -> Result<Option<PlanEntity>>;

    async fn create(&self, insert_plan_entity: InsertPlanEntity) -> Result<PlanEntity>;

    async fn set_active(&self, plan_id: Uuid, is_active: bool) -> Result<PlanEntity>;
}
