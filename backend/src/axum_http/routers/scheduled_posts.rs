use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use crates::{
    domain::{
        repositories::{
            scheduled_posts::ScheduledPostRepository, social_accounts::SocialAccountRepository,
            videos::VideoRepository,
        },
        value_objects::scheduled_posts::{CreateScheduledPostRequest, ScheduledPostsQuery},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            scheduled_posts::ScheduledPostPostgres, social_accounts::SocialAccountPostgres,
            videos::VideoPostgres,
        },
    },
};
use uuid::Uuid;

use crate::{auth::AuthUser, usecases::scheduled_posts::ScheduledPostUseCase};

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let scheduled_posts_usecase = ScheduledPostUseCase::new(
        Arc::new(ScheduledPostPostgres::new(Arc::clone(&db_pool))),
        Arc::new(VideoPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SocialAccountPostgres::new(Arc::clone(&db_pool))),
    );

    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_post).delete(cancel))
        .with_state(Arc::new(scheduled_posts_usecase))
}

pub async fn create<SP, V, A>(
    State(scheduled_posts_usecase): State<Arc<ScheduledPostUseCase<SP, V, A>>>,
    auth: AuthUser,
    Json(request): Json<CreateScheduledPostRequest>,
) -> impl IntoResponse
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    match scheduled_posts_usecase
        .create(auth.user_id, request, Utc::now())
        .await
    {
        Ok(post) => (StatusCode::CREATED, Json(post)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list<SP, V, A>(
    State(scheduled_posts_usecase): State<Arc<ScheduledPostUseCase<SP, V, A>>>,
    auth: AuthUser,
    Query(query): Query<ScheduledPostsQuery>,
) -> impl IntoResponse
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    match scheduled_posts_usecase
        .list(auth.user_id, query.status.as_deref())
        .await
    {
        Ok(posts) => (StatusCode::OK, Json(posts)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_post<SP, V, A>(
    State(scheduled_posts_usecase): State<Arc<ScheduledPostUseCase<SP, V, A>>>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
) -> impl IntoResponse
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    match scheduled_posts_usecase.get(auth.user_id, post_id).await {
        Ok(post) => (StatusCode::OK, Json(post)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cancel<SP, V, A>(
    State(scheduled_posts_usecase): State<Arc<ScheduledPostUseCase<SP, V, A>>>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
) -> impl IntoResponse
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    match scheduled_posts_usecase.cancel(auth.user_id, post_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
