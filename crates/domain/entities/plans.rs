use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::plans::PlanFeatures,
    infra::db::postgres::schema::subscription_plans,
};

#[derive(Debug, Clone)]
pub struct PlanEntity {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i32,
    pub currency: String,
    pub billing_interval: String,
    pub stripe_price_id: Option<String>,
    pub minutes_allowed: i32,
    pub features: PlanFeatures,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Raw row used for Diesel queries. Features stay as JSON and are parsed into PlanFeatures.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscription_plans)]
pub struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i32,
    pub currency: String,
    pub billing_interval: String,
    pub stripe_price_id: Option<String>,
    pub minutes_allowed: i32,
    pub features: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PlanRow> for PlanEntity {
    fn from(value: PlanRow) -> Self {
        let features = serde_json::from_value(value.features).unwrap_or_default();

        Self {
            id: value.id,
            name: value.name,
            description: value.description,
            price_minor: value.price_minor,
            currency: value.currency,
            billing_interval: value.billing_interval,
            stripe_price_id: value.stripe_price_id,
            minutes_allowed: value.minutes_allowed,
            features,
            is_active: value.is_active,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscription_plans)]
pub struct InsertPlanEntity {
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i32,
    pub currency: String,
    pub billing_interval: String,
    pub stripe_price_id: Option<String>,
    pub minutes_allowed: i32,
    pub features: serde_json::Value,
    pub is_active: bool,
}
