use std::{collections::HashMap, sync::Arc};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, TimeZone, Utc};
use crates::{
    domain::{
        entities::{
            plans::PlanEntity,
            subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity},
        },
        repositories::{
            plans::PlanRepository, subscriptions::SubscriptionRepository, users::UserRepository,
        },
        value_objects::{
            enums::subscription_statuses::SubscriptionStatus,
            subscriptions::{CurrentSubscriptionDto, PlanDto},
        },
    },
    payments::stripe_client::{StripeClient, StripeEvent, StripeSubscription},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::axum_http::error_responses::impl_error_response;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn create_customer(&self, email: &str, user_id: Uuid) -> AnyResult<String>;

    async fn create_checkout_session(
        &self,
        price_id: &str,
        customer_id: &str,
        user_id: Uuid,
        metadata: HashMap<String, String>,
    ) -> AnyResult<String>;

    async fn create_portal_session(&self, customer_id: &str) -> AnyResult<String>;

    async fn cancel_subscription(&self, subscription_id: &str) -> AnyResult<()>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription>;

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        now_unix: i64,
    ) -> AnyResult<StripeEvent>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn create_customer(&self, email: &str, user_id: Uuid) -> AnyResult<String> {
        self.create_customer(email, user_id).await
    }

    async fn create_checkout_session(
        &self,
        price_id: &str,
        customer_id: &str,
        user_id: Uuid,
        metadata: HashMap<String, String>,
    ) -> AnyResult<String> {
        self.create_checkout_session(price_id, customer_id, user_id, metadata)
            .await
    }

    async fn create_portal_session(&self, customer_id: &str) -> AnyResult<String> {
        self.create_portal_session(customer_id).await
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AnyResult<()> {
        self.cancel_subscription(subscription_id).await
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription> {
        self.retrieve_subscription(subscription_id).await
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        now_unix: i64,
    ) -> AnyResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature, now_unix)
    }
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("plan not found")]
    PlanNotFound,
    #[error("plan has no Stripe price configured")]
    MissingPrice,
    #[error("user not found")]
    UserNotFound,
    #[error("no billing account exists for this user yet")]
    NoCustomer,
    #[error("invalid webhook: {0}")]
    InvalidWebhook(String),
    #[error("no active subscription to cancel")]
    SubscriptionNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::PlanNotFound
            | SubscriptionError::UserNotFound
            | SubscriptionError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            SubscriptionError::MissingPrice
            | SubscriptionError::NoCustomer
            | SubscriptionError::InvalidWebhook(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl_error_response!(SubscriptionError);

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub fn current_subscription_dto(
    subscription: SubscriptionEntity,
    plan: PlanEntity,
) -> CurrentSubscriptionDto {
    CurrentSubscriptionDto {
        plan_id: plan.id,
        plan_name: plan.name,
        status: SubscriptionStatus::from_str(&subscription.status),
        minutes_used: subscription.minutes_used,
        minutes_allowed: subscription.minutes_allowed,
        minutes_remaining: (subscription.minutes_allowed - subscription.minutes_used).max(0),
        current_period_start: subscription.current_period_start,
        current_period_end: subscription.current_period_end,
        cancel_at_period_end: subscription.cancel_at_period_end,
        features: plan.features,
    }
}

fn from_unix(timestamp: Option<i64>) -> Option<DateTime<Utc>> {
    timestamp.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

pub struct SubscriptionUseCase<P, S, U, Stripe>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    plan_repo: Arc<P>,
    subscription_repo: Arc<S>,
    user_repo: Arc<U>,
    stripe_client: Arc<Stripe>,
}

impl<P, S, U, Stripe> SubscriptionUseCase<P, S, U, Stripe>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub fn new(
        plan_repo: Arc<P>,
        subscription_repo: Arc<S>,
        user_repo: Arc<U>,
        stripe_client: Arc<Stripe>,
    ) -> Self {
        Self {
            plan_repo,
            subscription_repo,
            user_repo,
            stripe_client,
        }
    }

    pub async fn list_plans(&self) -> UseCaseResult<Vec<PlanDto>> {
        let plans = self.plan_repo.list_active_plans().await.map_err(|err| {
            error!(db_error = ?err, "subscriptions: failed to list active plans");
            SubscriptionError::Internal(err)
        })?;
        let plan_count = plans.len();
        debug!(plan_count, "subscriptions: active plans loaded");
        Ok(plans.into_iter().map(PlanDto::from).collect())
    }

    pub async fn get_current_subscription(
        &self,
        user_id: Uuid,
    ) -> UseCaseResult<Option<CurrentSubscriptionDto>> {
        let subscription = match self
            .subscription_repo
            .find_by_user_id(user_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "subscriptions: failed to load current subscription"
                );
                SubscriptionError::Internal(err)
            })? {
            Some(subscription) => subscription,
            None => {
                info!(%user_id, "subscriptions: no subscription");
                return Ok(None);
            }
        };

        let plan = self
            .plan_repo
            .find_by_id(subscription.plan_id)
            .await?
            .ok_or_else(|| {
                error!(
                    %user_id,
                    plan_id = %subscription.plan_id,
                    "subscriptions: subscription references a missing plan"
                );
                SubscriptionError::PlanNotFound
            })?;

        Ok(Some(current_subscription_dto(subscription, plan)))
    }

    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> UseCaseResult<String> {
        info!(%user_id, %plan_id, "subscriptions: create checkout session requested");

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(SubscriptionError::UserNotFound)?;

        let plan = self
            .plan_repo
            .find_by_id(plan_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %plan_id,
                    db_error = ?err,
                    "subscriptions: failed to load plan for checkout"
                );
                SubscriptionError::Internal(err)
            })?
            .filter(|plan| plan.is_active)
            .ok_or_else(|| {
                warn!(%user_id, %plan_id, "subscriptions: checkout for unknown or inactive plan");
                SubscriptionError::PlanNotFound
            })?;

        let price_id = plan.stripe_price_id.clone().ok_or_else(|| {
            let err = SubscriptionError::MissingPrice;
            warn!(
                %user_id,
                %plan_id,
                status = err.status_code().as_u16(),
                "subscriptions: plan has no stripe price"
            );
            err
        })?;

        let customer_id = match user.stripe_customer_id.clone() {
            Some(customer_id) => customer_id,
            None => {
                let customer_id = self
                    .stripe_client
                    .create_customer(&user.email, user_id)
                    .await
                    .map_err(|err| {
                        error!(%user_id, error = ?err, "subscriptions: failed to create stripe customer");
                        SubscriptionError::Internal(err)
                    })?;
                self.user_repo
                    .set_stripe_customer_id(user_id, &customer_id)
                    .await?;
                info!(%user_id, %customer_id, "subscriptions: stripe customer created");
                customer_id
            }
        };

        let metadata = HashMap::from([
            ("user_id".to_string(), user_id.to_string()),
            ("plan_id".to_string(), plan_id.to_string()),
        ]);

        let url = self
            .stripe_client
            .create_checkout_session(&price_id, &customer_id, user_id, metadata)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %plan_id,
                    error = ?err,
                    "subscriptions: failed to create checkout session"
                );
                SubscriptionError::Internal(err)
            })?;

        info!(%user_id, %plan_id, "subscriptions: checkout session created");
        Ok(url)
    }

    pub async fn create_portal_session(&self, user_id: Uuid) -> UseCaseResult<String> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(SubscriptionError::UserNotFound)?;

        let customer_id = user.stripe_customer_id.ok_or_else(|| {
            warn!(%user_id, "subscriptions: portal requested without stripe customer");
            SubscriptionError::NoCustomer
        })?;

        let url = self
            .stripe_client
            .create_portal_session(&customer_id)
            .await
            .map_err(|err| {
                error!(%user_id, error = ?err, "subscriptions: failed to create portal session");
                SubscriptionError::Internal(err)
            })?;
        Ok(url)
    }

    pub async fn cancel_subscription(&self, user_id: Uuid) -> UseCaseResult<()> {
        let subscription = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await?
            .filter(|subscription| {
                SubscriptionStatus::from_str(&subscription.status) != SubscriptionStatus::Canceled
            })
            .ok_or(SubscriptionError::SubscriptionNotFound)?;

        let stripe_subscription_id = subscription
            .stripe_subscription_id
            .ok_or(SubscriptionError::SubscriptionNotFound)?;

        self.stripe_client
            .cancel_subscription(&stripe_subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %stripe_subscription_id,
                    error = ?err,
                    "subscriptions: failed to cancel at stripe"
                );
                SubscriptionError::Internal(err)
            })?;

        self.subscription_repo
            .mark_cancel_at_period_end(user_id)
            .await?;

        info!(%user_id, %stripe_subscription_id, "subscriptions: cancel at period end scheduled");
        Ok(())
    }

    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> UseCaseResult<()> {
        let event = self
            .stripe_client
            .verify_webhook_signature(payload, signature, now.timestamp())
            .map_err(|err| {
                warn!(error = ?err, "subscriptions: webhook signature rejected");
                SubscriptionError::InvalidWebhook(err.to_string())
            })?;

        info!(
            event_id = ?event.id,
            event_type = %event.type_,
            "subscriptions: webhook received"
        );

        match event.type_.as_str() {
            "checkout.session.completed" => self.on_checkout_completed(&event).await,
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.on_subscription_updated(&event).await
            }
            "customer.subscription.deleted" => self.on_subscription_deleted(&event).await,
            "invoice.payment_succeeded" | "invoice.paid" => self.on_invoice_paid(&event).await,
            "invoice.payment_failed" => self.on_invoice_failed(&event).await,
            other => {
                debug!(event_type = %other, "subscriptions: ignoring webhook event");
                Ok(())
            }
        }
    }

    async fn on_checkout_completed(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let session = StripeClient::extract_checkout_session(event).ok_or_else(|| {
            SubscriptionError::InvalidWebhook("malformed checkout session".to_string())
        })?;

        if session.mode.as_deref() != Some("subscription") {
            debug!(session_id = ?session.id, "subscriptions: ignoring non-subscription checkout");
            return Ok(());
        }

        let user_id = session
            .metadata
            .get("user_id")
            .map(String::as_str)
            .or(session.client_reference_id.as_deref())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| {
                SubscriptionError::InvalidWebhook("checkout session has no user_id".to_string())
            })?;

        let stripe_subscription_id = session.subscription.clone().ok_or_else(|| {
            SubscriptionError::InvalidWebhook("checkout session has no subscription".to_string())
        })?;

        let stripe_subscription = self
            .stripe_client
            .retrieve_subscription(&stripe_subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %stripe_subscription_id,
                    error = ?err,
                    "subscriptions: failed to retrieve subscription after checkout"
                );
                SubscriptionError::Internal(err)
            })?;

        let plan = self
            .resolve_plan(
                session.metadata.get("plan_id").map(String::as_str),
                stripe_subscription.price_id(),
            )
            .await?
            .ok_or_else(|| {
                error!(%user_id, %stripe_subscription_id, "subscriptions: checkout for unknown plan");
                SubscriptionError::PlanNotFound
            })?;

        let status = SubscriptionStatus::from_str(&stripe_subscription.status);
        let subscription = self
            .subscription_repo
            .upsert_for_user(UpsertSubscriptionEntity {
                user_id,
                plan_id: plan.id,
                status: status.to_string(),
                minutes_allowed: plan.minutes_allowed,
                stripe_subscription_id: Some(stripe_subscription.id.clone()),
                stripe_price_id: stripe_subscription
                    .price_id()
                    .map(str::to_string)
                    .or(plan.stripe_price_id.clone()),
                current_period_start: from_unix(stripe_subscription.period_start()),
                current_period_end: from_unix(stripe_subscription.period_end()),
                cancel_at_period_end: stripe_subscription.cancel_at_period_end,
            })
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "subscriptions: failed to store subscription");
                SubscriptionError::Internal(err)
            })?;

        if let Some(customer_id) = session.customer.as_deref() {
            self.user_repo
                .set_stripe_customer_id(user_id, customer_id)
                .await?;
        }
        self.user_repo
            .set_subscribed(user_id, status.grants_access())
            .await?;

        info!(
            %user_id,
            subscription_id = %subscription.id,
            plan_id = %plan.id,
            status = %status,
            "subscriptions: checkout completed"
        );
        Ok(())
    }

    async fn on_subscription_updated(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let stripe_subscription = StripeClient::extract_subscription(event).ok_or_else(|| {
            SubscriptionError::InvalidWebhook("malformed subscription".to_string())
        })?;
        let status = SubscriptionStatus::from_str(&stripe_subscription.status);

        let Some(existing) = self
            .subscription_repo
            .find_by_stripe_subscription_id(&stripe_subscription.id)
            .await?
        else {
            // Created events can beat checkout.session.completed; that handler stores the row.
            debug!(
                stripe_subscription_id = %stripe_subscription.id,
                "subscriptions: update for unknown subscription"
            );
            return Ok(());
        };

        // A plan switch made in the billing portal shows up as a new price.
        let new_plan = match stripe_subscription.price_id() {
            Some(price_id) if existing.stripe_price_id.as_deref() != Some(price_id) => {
                self.plan_repo.find_by_stripe_price_id(price_id).await?
            }
            _ => None,
        };

        let updated = match new_plan {
            Some(plan) => {
                info!(
                    user_id = %existing.user_id,
                    plan_id = %plan.id,
                    "subscriptions: plan changed at stripe"
                );
                Some(
                    self.subscription_repo
                        .upsert_for_user(UpsertSubscriptionEntity {
                            user_id: existing.user_id,
                            plan_id: plan.id,
                            status: status.to_string(),
                            minutes_allowed: plan.minutes_allowed,
                            stripe_subscription_id: Some(stripe_subscription.id.clone()),
                            stripe_price_id: stripe_subscription.price_id().map(str::to_string),
                            current_period_start: from_unix(stripe_subscription.period_start()),
                            current_period_end: from_unix(stripe_subscription.period_end()),
                            cancel_at_period_end: stripe_subscription.cancel_at_period_end,
                        })
                        .await?,
                )
            }
            None => {
                self.subscription_repo
                    .update_from_provider(
                        &stripe_subscription.id,
                        status,
                        from_unix(stripe_subscription.period_start()),
                        from_unix(stripe_subscription.period_end()),
                        stripe_subscription.cancel_at_period_end,
                    )
                    .await?
            }
        };

        if let Some(subscription) = updated {
            self.user_repo
                .set_subscribed(subscription.user_id, status.grants_access())
                .await?;
            info!(
                user_id = %subscription.user_id,
                status = %status,
                cancel_at_period_end = stripe_subscription.cancel_at_period_end,
                "subscriptions: subscription updated"
            );
        }
        Ok(())
    }

    async fn on_subscription_deleted(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let stripe_subscription = StripeClient::extract_subscription(event).ok_or_else(|| {
            SubscriptionError::InvalidWebhook("malformed subscription".to_string())
        })?;

        self.apply_status(&stripe_subscription.id, SubscriptionStatus::Canceled)
            .await?;
        Ok(())
    }

    async fn on_invoice_paid(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let invoice = StripeClient::extract_invoice(event)
            .ok_or_else(|| SubscriptionError::InvalidWebhook("malformed invoice".to_string()))?;
        let Some(stripe_subscription_id) = invoice.subscription else {
            debug!(invoice_id = ?invoice.id, "subscriptions: invoice without subscription");
            return Ok(());
        };

        let updated = self
            .apply_status(&stripe_subscription_id, SubscriptionStatus::Active)
            .await?;

        // Mid-period prorations keep the current usage.
        if updated && invoice.billing_reason.as_deref() != Some("subscription_update") {
            self.subscription_repo
                .reset_usage_by_stripe_subscription_id(&stripe_subscription_id)
                .await?;
            info!(%stripe_subscription_id, "subscriptions: usage reset for new period");
        }
        Ok(())
    }

    async fn on_invoice_failed(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let invoice = StripeClient::extract_invoice(event)
            .ok_or_else(|| SubscriptionError::InvalidWebhook("malformed invoice".to_string()))?;
        if let Some(stripe_subscription_id) = invoice.subscription {
            self.apply_status(&stripe_subscription_id, SubscriptionStatus::PastDue)
                .await?;
        }
        Ok(())
    }

    /// Returns false when no local subscription matches.
    async fn apply_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> UseCaseResult<bool> {
        let updated = self
            .subscription_repo
            .update_status_by_stripe_subscription_id(stripe_subscription_id, status)
            .await
            .map_err(|err| {
                error!(
                    %stripe_subscription_id,
                    status = %status,
                    db_error = ?err,
                    "subscriptions: failed to update subscription status"
                );
                SubscriptionError::Internal(err)
            })?;

        match updated {
            Some(subscription) => {
                self.user_repo
                    .set_subscribed(subscription.user_id, status.grants_access())
                    .await?;
                info!(
                    user_id = %subscription.user_id,
                    %stripe_subscription_id,
                    status = %status,
                    "subscriptions: status updated"
                );
                Ok(true)
            }
            None => {
                warn!(%stripe_subscription_id, "subscriptions: webhook for unknown subscription");
                Ok(false)
            }
        }
    }

    async fn resolve_plan(
        &self,
        plan_id: Option<&str>,
        price_id: Option<&str>,
    ) -> AnyResult<Option<PlanEntity>> {
        if let Some(plan_id) = plan_id.and_then(|raw| Uuid::parse_str(raw).ok()) {
            if let Some(plan) = self.plan_repo.find_by_id(plan_id).await? {
                return Ok(Some(plan));
            }
        }
        match price_id {
            Some(price_id) => self.plan_repo.find_by_stripe_price_id(price_id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::{
        domain::{
            entities::users::UserEntity,
            repositories::{
                plans::MockPlanRepository, subscriptions::MockSubscriptionRepository,
                users::MockUserRepository,
            },
            value_objects::plans::PlanFeatures,
        },
        payments::stripe_client::StripeEventData,
    };
    use mockall::predicate::eq;
    use serde_json::json;

    type TestUseCase = SubscriptionUseCase<
        MockPlanRepository,
        MockSubscriptionRepository,
        MockUserRepository,
        MockStripeGateway,
    >;

    struct Mocks {
        plans: MockPlanRepository,
        subscriptions: MockSubscriptionRepository,
        users: MockUserRepository,
        stripe: MockStripeGateway,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                plans: MockPlanRepository::new(),
                subscriptions: MockSubscriptionRepository::new(),
                users: MockUserRepository::new(),
                stripe: MockStripeGateway::new(),
            }
        }

        fn build(self) -> TestUseCase {
            SubscriptionUseCase::new(
                Arc::new(self.plans),
                Arc::new(self.subscriptions),
                Arc::new(self.users),
                Arc::new(self.stripe),
            )
        }
    }

    fn plan(id: Uuid, price: Option<&str>) -> PlanEntity {
        PlanEntity {
            id,
            name: "Pro".to_string(),
            description: None,
            price_minor: 1900,
            currency: "usd".to_string(),
            billing_interval: "month".to_string(),
            stripe_price_id: price.map(str::to_string),
            minutes_allowed: 300,
            features: PlanFeatures::default(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn user(id: Uuid, customer: Option<&str>) -> UserEntity {
        let now = Utc::now();
        UserEntity {
            id,
            email: "buyer@example.com".to_string(),
            password_hash: "hash".to_string(),
            name: None,
            role: "user".to_string(),
            stripe_customer_id: customer.map(str::to_string),
            is_subscribed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn subscription(user_id: Uuid, plan_id: Uuid, status: &str) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan_id,
            status: status.to_string(),
            minutes_used: 40,
            minutes_allowed: 300,
            stripe_subscription_id: Some("sub_123".to_string()),
            stripe_price_id: Some("price_pro".to_string()),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn event(type_: &str, object: serde_json::Value) -> StripeEvent {
        StripeEvent {
            id: Some("evt_1".to_string()),
            type_: type_.to_string(),
            created: None,
            data: StripeEventData { object },
        }
    }

    #[tokio::test]
    async fn checkout_creates_customer_once_and_returns_url() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .users
            .expect_find_by_id()
            .with(eq(user_id))
            .returning(|id| Ok(Some(user(id, None))));
        mocks
            .plans
            .expect_find_by_id()
            .with(eq(plan_id))
            .returning(|id| Ok(Some(plan(id, Some("price_pro")))));
        mocks
            .stripe
            .expect_create_customer()
            .times(1)
            .returning(|_, _| Ok("cus_new".to_string()));
        mocks
            .users
            .expect_set_stripe_customer_id()
            .withf(move |id, customer| *id == user_id && customer == "cus_new")
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .stripe
            .expect_create_checkout_session()
            .withf(move |price, customer, uid, metadata| {
                price == "price_pro"
                    && customer == "cus_new"
                    && *uid == user_id
                    && metadata.get("plan_id") == Some(&plan_id.to_string())
            })
            .returning(|_, _, _, _| Ok("https://checkout.stripe.com/c/pay".to_string()));

        let url = mocks
            .build()
            .create_checkout_session(user_id, plan_id)
            .await
            .unwrap();

        assert_eq!(url, "https://checkout.stripe.com/c/pay");
    }

    #[tokio::test]
    async fn checkout_for_plan_without_price_is_bad_request() {
        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_id()
            .returning(|id| Ok(Some(user(id, Some("cus_1")))));
        mocks
            .plans
            .expect_find_by_id()
            .returning(|id| Ok(Some(plan(id, None))));
        mocks.stripe.expect_create_checkout_session().never();

        let err = mocks
            .build()
            .create_checkout_session(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::MissingPrice));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn portal_requires_a_customer() {
        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_id()
            .returning(|id| Ok(Some(user(id, None))));

        let err = mocks
            .build()
            .create_portal_session(Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::NoCustomer));
    }

    #[tokio::test]
    async fn cancel_marks_cancel_at_period_end_at_stripe_and_locally() {
        let user_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        mocks
            .subscriptions
            .expect_find_by_user_id()
            .returning(|uid| Ok(Some(subscription(uid, Uuid::new_v4(), "active"))));
        mocks
            .stripe
            .expect_cancel_subscription()
            .withf(|id| id == "sub_123")
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .subscriptions
            .expect_mark_cancel_at_period_end()
            .with(eq(user_id))
            .times(1)
            .returning(|_| Ok(()));

        mocks.build().cancel_subscription(user_id).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_without_subscription_is_not_found() {
        let mut mocks = Mocks::new();
        mocks
            .subscriptions
            .expect_find_by_user_id()
            .returning(|_| Ok(None));

        let err = mocks
            .build()
            .cancel_subscription(Uuid::new_v4())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_rejected() {
        let mut mocks = Mocks::new();
        mocks
            .stripe
            .expect_verify_webhook_signature()
            .returning(|_, _, _| Err(anyhow::anyhow!("invalid webhook signature")));

        let err = mocks
            .build()
            .handle_webhook(b"{}", "t=1,v1=00", Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn checkout_completed_upserts_the_single_subscription_row() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .stripe
            .expect_verify_webhook_signature()
            .returning(move |_, _, _| {
                Ok(event(
                    "checkout.session.completed",
                    json!({
                        "id": "cs_1",
                        "mode": "subscription",
                        "subscription": "sub_123",
                        "customer": "cus_1",
                        "metadata": {"user_id": user_id.to_string(), "plan_id": plan_id.to_string()}
                    }),
                ))
            });
        mocks
            .stripe
            .expect_retrieve_subscription()
            .withf(|id| id == "sub_123")
            .returning(|_| {
                Ok(serde_json::from_value(json!({
                    "id": "sub_123",
                    "status": "active",
                    "current_period_start": 1_700_000_000,
                    "current_period_end": 1_702_592_000,
                    "items": {"data": [{"price": {"id": "price_pro"}}]}
                }))
                .unwrap())
            });
        mocks
            .plans
            .expect_find_by_id()
            .with(eq(plan_id))
            .returning(|id| Ok(Some(plan(id, Some("price_pro")))));
        mocks
            .subscriptions
            .expect_upsert_for_user()
            .withf(move |upsert| {
                upsert.user_id == user_id
                    && upsert.plan_id == plan_id
                    && upsert.status == "active"
                    && upsert.minutes_allowed == 300
                    && upsert.stripe_subscription_id.as_deref() == Some("sub_123")
                    && upsert.current_period_end.is_some()
            })
            .times(1)
            .returning(move |upsert| Ok(subscription(upsert.user_id, upsert.plan_id, "active")));
        mocks
            .users
            .expect_set_stripe_customer_id()
            .returning(|_, _| Ok(()));
        mocks
            .users
            .expect_set_subscribed()
            .with(eq(user_id), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));

        mocks
            .build()
            .handle_webhook(b"{}", "sig", Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn subscription_deleted_cancels_and_unsubscribes() {
        let user_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        mocks
            .stripe
            .expect_verify_webhook_signature()
            .returning(|_, _, _| {
                Ok(event(
                    "customer.subscription.deleted",
                    json!({"id": "sub_123", "status": "canceled"}),
                ))
            });
        mocks
            .subscriptions
            .expect_update_status_by_stripe_subscription_id()
            .withf(|id, status| id == "sub_123" && *status == SubscriptionStatus::Canceled)
            .returning(move |_, _| Ok(Some(subscription(user_id, Uuid::new_v4(), "canceled"))));
        mocks
            .users
            .expect_set_subscribed()
            .with(eq(user_id), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        mocks
            .build()
            .handle_webhook(b"{}", "sig", Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn renewal_invoice_resets_usage_but_proration_does_not() {
        let user_id = Uuid::new_v4();

        for (reason, expect_reset) in [("subscription_cycle", 1), ("subscription_update", 0)] {
            let mut mocks = Mocks::new();
            mocks
                .stripe
                .expect_verify_webhook_signature()
                .returning(move |_, _, _| {
                    Ok(event(
                        "invoice.payment_succeeded",
                        json!({"id": "in_1", "subscription": "sub_123", "billing_reason": reason}),
                    ))
                });
            mocks
                .subscriptions
                .expect_update_status_by_stripe_subscription_id()
                .returning(move |_, _| Ok(Some(subscription(user_id, Uuid::new_v4(), "active"))));
            mocks
                .users
                .expect_set_subscribed()
                .returning(|_, _| Ok(()));
            mocks
                .subscriptions
                .expect_reset_usage_by_stripe_subscription_id()
                .times(expect_reset)
                .returning(|_| Ok(()));

            mocks
                .build()
                .handle_webhook(b"{}", "sig", Utc::now())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn payment_failure_marks_past_due() {
        let mut mocks = Mocks::new();
        mocks
            .stripe
            .expect_verify_webhook_signature()
            .returning(|_, _, _| {
                Ok(event(
                    "invoice.payment_failed",
                    json!({"subscription": "sub_123"}),
                ))
            });
        mocks
            .subscriptions
            .expect_update_status_by_stripe_subscription_id()
            .withf(|_, status| *status == SubscriptionStatus::PastDue)
            .returning(|_, _| Ok(None));

        mocks
            .build()
            .handle_webhook(b"{}", "sig", Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_events_are_acknowledged() {
        let mut mocks = Mocks::new();
        mocks
            .stripe
            .expect_verify_webhook_signature()
            .returning(|_, _, _| Ok(event("charge.refunded", json!({}))));

        mocks
            .build()
            .handle_webhook(b"{}", "sig", Utc::now())
            .await
            .unwrap();
    }
}
