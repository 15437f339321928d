use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use crates::{
    domain::{
        repositories::{
            plans::PlanRepository, subscriptions::SubscriptionRepository, users::UserRepository,
        },
        value_objects::users::{LoginRequest, RegisterRequest},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{plans::PlanPostgres, subscriptions::SubscriptionPostgres, users::UserPostgres},
    },
};

use crate::{auth::AuthUser, services::SharedServices, usecases::auth::AuthUseCase};

pub fn routes(db_pool: Arc<PgPoolSquad>, services: &SharedServices) -> Router {
    let user_repository = UserPostgres::new(Arc::clone(&db_pool));
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let plan_repository = PlanPostgres::new(Arc::clone(&db_pool));
    let auth_usecase = AuthUseCase::new(
        Arc::new(user_repository),
        Arc::new(subscription_repository),
        Arc::new(plan_repository),
        Arc::clone(&services.session_keys),
    );

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(Arc::new(auth_usecase))
}

pub async fn register<U, S, P>(
    State(auth_usecase): State<Arc<AuthUseCase<U, S, P>>>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match auth_usecase.register(request).await {
        Ok(response) => {
            let jar = jar.add(auth_usecase.session_keys().session_cookie(response.token.clone()));
            (StatusCode::CREATED, jar, Json(response)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn login<U, S, P>(
    State(auth_usecase): State<Arc<AuthUseCase<U, S, P>>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match auth_usecase.login(request).await {
        Ok(response) => {
            let jar = jar.add(auth_usecase.session_keys().session_cookie(response.token.clone()));
            (StatusCode::OK, jar, Json(response)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn logout<U, S, P>(
    State(auth_usecase): State<Arc<AuthUseCase<U, S, P>>>,
    jar: CookieJar,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    let jar = jar.add(auth_usecase.session_keys().removal_cookie());
    (StatusCode::NO_CONTENT, jar).into_response()
}

pub async fn me<U, S, P>(
    State(auth_usecase): State<Arc<AuthUseCase<U, S, P>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match auth_usecase.me(auth.user_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}
