use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use crates::{
    domain::repositories::{
        plans::PlanRepository, scheduled_posts::ScheduledPostRepository,
        subscriptions::SubscriptionRepository, video_processor::VideoProcessor,
        videos::VideoRepository,
    },
    infra::db::postgres::postgres_connection::PgPoolSquad,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    axum_http::{error_responses::error_response, file_responses::serve_file},
    config::config_model::Storage,
    services::SharedServices,
    usecases::videos::VideoUseCase,
};

use super::videos::video_usecase;

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub token: Option<String>,
}

/// Public, token-authenticated file access for platforms that pull media by URL.
pub fn routes(db_pool: Arc<PgPoolSquad>, services: &SharedServices, storage: &Storage) -> Router {
    let videos_usecase = video_usecase(db_pool, services, storage);

    Router::new()
        .route("/:id", get(media_file))
        .with_state(Arc::new(videos_usecase))
}

pub async fn media_file<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    Path(video_id): Path<Uuid>,
    Query(query): Query<MediaQuery>,
    headers: HeaderMap,
) -> Response
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    let Some(token) = query.token.filter(|token| !token.is_empty()) else {
        return error_response(StatusCode::UNAUTHORIZED, "Missing media token");
    };

    match videos_usecase
        .media_file(video_id, &token, Utc::now())
        .await
    {
        Ok(file) => serve_file(file, &headers).await,
        Err(e) => e.into_response(),
    }
}
