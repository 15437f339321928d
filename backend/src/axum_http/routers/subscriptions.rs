use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use crates::{
    domain::{
        repositories::{
            plans::PlanRepository, subscriptions::SubscriptionRepository, users::UserRepository,
        },
        value_objects::subscriptions::{CheckoutResponse, CreateCheckoutRequest, PortalResponse},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{plans::PlanPostgres, subscriptions::SubscriptionPostgres, users::UserPostgres},
    },
};
use tracing::warn;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::error_response,
    services::SharedServices,
    usecases::subscriptions::{StripeGateway, SubscriptionUseCase},
};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes(db_pool: Arc<PgPoolSquad>, services: &SharedServices) -> Router {
    let plan_repository = PlanPostgres::new(Arc::clone(&db_pool));
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let user_repository = UserPostgres::new(Arc::clone(&db_pool));
    let subscriptions_usecase = SubscriptionUseCase::new(
        Arc::new(plan_repository),
        Arc::new(subscription_repository),
        Arc::new(user_repository),
        Arc::clone(&services.stripe_client),
    );

    router(Arc::new(subscriptions_usecase))
}

fn router<P, S, U, Stripe>(usecase: Arc<SubscriptionUseCase<P, S, U, Stripe>>) -> Router
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/plans", get(list_plans))
        .route("/current", get(current_subscription))
        .route("/checkout", post(create_checkout_session))
        .route("/portal", post(create_portal_session))
        .route("/cancel", post(cancel_subscription))
        .route("/webhook", post(webhook))
        .with_state(usecase)
}

pub async fn list_plans<P, S, U, Stripe>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<P, S, U, Stripe>>>,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    match subscriptions_usecase.list_plans().await {
        Ok(plans) => (StatusCode::OK, Json(plans)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn current_subscription<P, S, U, Stripe>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<P, S, U, Stripe>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    match subscriptions_usecase
        .get_current_subscription(auth.user_id)
        .await
    {
        Ok(subscription) => (StatusCode::OK, Json(subscription)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_checkout_session<P, S, U, Stripe>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<P, S, U, Stripe>>>,
    auth: AuthUser,
    Json(request): Json<CreateCheckoutRequest>,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    match subscriptions_usecase
        .create_checkout_session(auth.user_id, request.plan_id)
        .await
    {
        Ok(checkout_url) => (StatusCode::OK, Json(CheckoutResponse { checkout_url })).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_portal_session<P, S, U, Stripe>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<P, S, U, Stripe>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    match subscriptions_usecase.create_portal_session(auth.user_id).await {
        Ok(portal_url) => (StatusCode::OK, Json(PortalResponse { portal_url })).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cancel_subscription<P, S, U, Stripe>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<P, S, U, Stripe>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    match subscriptions_usecase.cancel_subscription(auth.user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Stripe calls this without a session; the signature header is the only authentication.
pub async fn webhook<P, S, U, Stripe>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<P, S, U, Stripe>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let Some(signature) = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("subscriptions: webhook without signature header");
        return error_response(StatusCode::BAD_REQUEST, "Missing Stripe-Signature header");
    };

    match subscriptions_usecase
        .handle_webhook(&body, signature, Utc::now())
        .await
    {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "received": true }))).into_response(),
        Err(e) => e.into_response(),
    }
}
