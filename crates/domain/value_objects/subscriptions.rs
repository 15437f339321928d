use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::plans::PlanEntity;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::domain::value_objects::plans::PlanFeatures;

#[derive(Debug, Serialize)]
pub struct PlanDto {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i32,
    pub currency: String,
    pub billing_interval: String,
    pub minutes_allowed: i32,
    pub features: PlanFeatures,
}

impl From<PlanEntity> for PlanDto {
    fn from(value: PlanEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            description: value.description,
            price_minor: value.price_minor,
            currency: value.currency,
            billing_interval: value.billing_interval,
            minutes_allowed: value.minutes_allowed,
            features: value.features,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminPlanDto {
    #[serde(flatten)]
    pub plan: PlanDto,
    pub stripe_price_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PlanEntity> for AdminPlanDto {
    fn from(value: PlanEntity) -> Self {
        let stripe_price_id = value.stripe_price_id.clone();
        let is_active = value.is_active;
        let created_at = value.created_at;
        Self {
            plan: PlanDto::from(value),
            stripe_price_id,
            is_active,
            created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CurrentSubscriptionDto {
    pub plan_id: Uuid,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    pub minutes_used: i32,
    pub minutes_allowed: i32,
    pub minutes_remaining: i32,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub features: PlanFeatures,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub portal_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i32,
    pub currency: Option<String>,
    pub billing_interval: String,
    pub stripe_price_id: Option<String>,
    pub minutes_allowed: i32,
    #[serde(default)]
    pub features: PlanFeatures,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub is_active: bool,
}
