use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{delete, get},
};
use chrono::Utc;
use crates::{
    domain::{
        repositories::{
            scheduled_posts::ScheduledPostRepository, social_accounts::SocialAccountRepository,
        },
        value_objects::social_accounts::OAuthCallbackQuery,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            scheduled_posts::ScheduledPostPostgres, social_accounts::SocialAccountPostgres,
        },
    },
};
use uuid::Uuid;

use crate::{
    auth::AuthUser, services::SharedServices, usecases::social_accounts::SocialAccountUseCase,
};

pub fn routes(db_pool: Arc<PgPoolSquad>, services: &SharedServices, frontend_url: &str) -> Router {
    let social_accounts_usecase = SocialAccountUseCase::new(
        Arc::new(SocialAccountPostgres::new(Arc::clone(&db_pool))),
        Arc::new(ScheduledPostPostgres::new(Arc::clone(&db_pool))),
        Arc::clone(&services.token_cipher),
        Arc::clone(&services.platforms),
        services.state_signer.clone(),
        frontend_url,
    );

    Router::new()
        .route("/platforms", get(available_platforms))
        .route("/accounts", get(list_accounts))
        .route("/accounts/:id", delete(disconnect))
        .route("/:platform/connect", get(connect))
        .route("/:platform/callback", get(callback))
        .with_state(Arc::new(social_accounts_usecase))
}

pub async fn available_platforms<A, SP>(
    State(social_accounts_usecase): State<Arc<SocialAccountUseCase<A, SP>>>,
    _auth: AuthUser,
) -> impl IntoResponse
where
    A: SocialAccountRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
{
    (
        StatusCode::OK,
        Json(social_accounts_usecase.available_platforms()),
    )
        .into_response()
}

pub async fn list_accounts<A, SP>(
    State(social_accounts_usecase): State<Arc<SocialAccountUseCase<A, SP>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    A: SocialAccountRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
{
    match social_accounts_usecase.list(auth.user_id).await {
        Ok(accounts) => (StatusCode::OK, Json(accounts)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn disconnect<A, SP>(
    State(social_accounts_usecase): State<Arc<SocialAccountUseCase<A, SP>>>,
    auth: AuthUser,
    Path(account_id): Path<Uuid>,
) -> impl IntoResponse
where
    A: SocialAccountRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
{
    match social_accounts_usecase
        .disconnect(auth.user_id, account_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn connect<A, SP>(
    State(social_accounts_usecase): State<Arc<SocialAccountUseCase<A, SP>>>,
    auth: AuthUser,
    Path(platform): Path<String>,
) -> impl IntoResponse
where
    A: SocialAccountRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
{
    match social_accounts_usecase
        .connect(auth.user_id, &platform, Utc::now())
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// The provider redirects the browser here. Failures, a missing session included, become a
/// frontend redirect carrying `?error=`.
pub async fn callback<A, SP>(
    State(social_accounts_usecase): State<Arc<SocialAccountUseCase<A, SP>>>,
    auth: Option<AuthUser>,
    Path(platform): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> impl IntoResponse
where
    A: SocialAccountRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
{
    let redirect_url = social_accounts_usecase
        .callback(
            &platform,
            query,
            auth.map(|auth| auth.user_id),
            Utc::now(),
        )
        .await;
    Redirect::to(&redirect_url)
}
