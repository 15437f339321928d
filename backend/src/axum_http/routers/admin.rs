use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch},
};
use crates::{
    domain::{
        repositories::{
            plans::PlanRepository, scheduled_posts::ScheduledPostRepository,
            subscriptions::SubscriptionRepository, users::UserRepository, videos::VideoRepository,
        },
        value_objects::{
            subscriptions::{CreatePlanRequest, UpdatePlanRequest},
            users::{PageQuery, UpdateRoleRequest},
        },
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            plans::PlanPostgres, scheduled_posts::ScheduledPostPostgres,
            subscriptions::SubscriptionPostgres, users::UserPostgres, videos::VideoPostgres,
        },
    },
};
use uuid::Uuid;

use crate::{auth::AdminUser, usecases::admin::AdminUseCase};

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let admin_usecase = AdminUseCase::new(
        Arc::new(UserPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(VideoPostgres::new(Arc::clone(&db_pool))),
        Arc::new(ScheduledPostPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
    );

    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/role", patch(update_user_role))
        .route("/users/:id", delete(delete_user))
        .route("/stats", get(dashboard_stats))
        .route("/plans", get(list_plans).post(create_plan))
        .route("/plans/:id", patch(update_plan))
        .with_state(Arc::new(admin_usecase))
}

pub async fn list_users<U, S, V, SP, P>(
    State(admin_usecase): State<Arc<AdminUseCase<U, S, V, SP, P>>>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match admin_usecase.list_users(query.page, query.per_page).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn update_user_role<U, S, V, SP, P>(
    State(admin_usecase): State<Arc<AdminUseCase<U, S, V, SP, P>>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateRoleRequest>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match admin_usecase
        .update_user_role(admin.user_id, user_id, request.role)
        .await
    {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_user<U, S, V, SP, P>(
    State(admin_usecase): State<Arc<AdminUseCase<U, S, V, SP, P>>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match admin_usecase.delete_user(admin.user_id, user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn dashboard_stats<U, S, V, SP, P>(
    State(admin_usecase): State<Arc<AdminUseCase<U, S, V, SP, P>>>,
    _admin: AdminUser,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match admin_usecase.dashboard_stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_plans<U, S, V, SP, P>(
    State(admin_usecase): State<Arc<AdminUseCase<U, S, V, SP, P>>>,
    _admin: AdminUser,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match admin_usecase.list_plans().await {
        Ok(plans) => (StatusCode::OK, Json(plans)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_plan<U, S, V, SP, P>(
    State(admin_usecase): State<Arc<AdminUseCase<U, S, V, SP, P>>>,
    _admin: AdminUser,
    Json(request): Json<CreatePlanRequest>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match admin_usecase.create_plan(request).await {
        Ok(plan) => (StatusCode::CREATED, Json(plan)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn update_plan<U, S, V, SP, P>(
    State(admin_usecase): State<Arc<AdminUseCase<U, S, V, SP, P>>>,
    _admin: AdminUser,
    Path(plan_id): Path<Uuid>,
    Json(request): Json<UpdatePlanRequest>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match admin_usecase.set_plan_active(plan_id, request.is_active).await {
        Ok(plan) => (StatusCode::OK, Json(plan)).into_response(),
        Err(e) => e.into_response(),
    }
}
