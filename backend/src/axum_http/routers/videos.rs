use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use crates::{
    domain::{
        repositories::{
            plans::PlanRepository, scheduled_posts::ScheduledPostRepository,
            subscriptions::SubscriptionRepository, video_processor::VideoProcessor,
            videos::VideoRepository,
        },
        value_objects::videos::ProcessOptions,
    },
    infra::{
        db::{
            postgres::postgres_connection::PgPoolSquad,
            repositories::{
                plans::PlanPostgres, scheduled_posts::ScheduledPostPostgres,
                subscriptions::SubscriptionPostgres, videos::VideoPostgres,
            },
        },
        ffmpeg::ffmpeg_processor::FfmpegProcessor,
    },
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    axum_http::{error_responses::error_response, file_responses::serve_file},
    config::config_model::Storage,
    services::SharedServices,
    usecases::videos::{StoredUpload, VideoUseCase},
};

pub type PostgresVideoUseCase = VideoUseCase<
    VideoPostgres,
    SubscriptionPostgres,
    PlanPostgres,
    ScheduledPostPostgres,
    FfmpegProcessor,
>;

const FILE_FIELD: &str = "file";
const TITLE_FIELD: &str = "title";
/// Room for multipart framing and text fields on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn video_usecase(
    db_pool: Arc<PgPoolSquad>,
    services: &SharedServices,
    storage: &Storage,
) -> PostgresVideoUseCase {
    VideoUseCase::new(
        Arc::new(VideoPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
        Arc::new(ScheduledPostPostgres::new(Arc::clone(&db_pool))),
        Arc::clone(&services.processor),
        services.storage.clone(),
        services.media_urls.clone(),
        storage.max_upload_mb,
    )
}

pub fn routes(db_pool: Arc<PgPoolSquad>, services: &SharedServices, storage: &Storage) -> Router {
    let videos_usecase = video_usecase(db_pool, services, storage);
    let upload_limit = usize::try_from(storage.max_upload_mb)
        .unwrap_or(usize::MAX / (1024 * 1024))
        .saturating_mul(1024 * 1024)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    router(Arc::new(videos_usecase), upload_limit)
}

fn router<V, S, P, SP, VP>(
    usecase: Arc<VideoUseCase<V, S, P, SP, VP>>,
    upload_limit: usize,
) -> Router
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/",
            post(upload)
                .layer::<_, Infallible>(DefaultBodyLimit::disable())
                .layer::<_, Infallible>(RequestBodyLimitLayer::new(upload_limit))
                .get(list),
        )
        .route("/:id", get(get_video).delete(delete_video))
        .route("/:id/process", post(process))
        .route("/:id/stream", get(stream))
        .route("/:id/thumbnail", get(thumbnail))
        .route("/:id/media-url", get(media_url))
        .with_state(usecase)
}

/// Multipart upload: a `file` part plus an optional `title` part.
pub async fn upload<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Response
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    let mut title: Option<String> = None;
    let mut stored: Option<StoredUpload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(user_id = %auth.user_id, error = %e, "videos: malformed multipart upload");
                if let Some(upload) = stored.as_ref() {
                    videos_usecase.discard_upload(upload).await;
                }
                return e.into_response();
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) if stored.is_none() => {
                let original_filename = field.file_name().unwrap_or("upload").to_string();
                let declared_mime = field.content_type().map(str::to_string);

                match videos_usecase
                    .store_upload(
                        auth.user_id,
                        &original_filename,
                        declared_mime.as_deref(),
                        Box::pin(field),
                    )
                    .await
                {
                    Ok(upload) => stored = Some(upload),
                    Err(e) => return e.into_response(),
                }
            }
            Some(FILE_FIELD) => {
                if let Some(upload) = stored.as_ref() {
                    videos_usecase.discard_upload(upload).await;
                }
                return error_response(StatusCode::BAD_REQUEST, "Only one file may be uploaded");
            }
            Some(TITLE_FIELD) => match field.text().await {
                Ok(text) => title = Some(text),
                Err(e) => {
                    if let Some(upload) = stored.as_ref() {
                        videos_usecase.discard_upload(upload).await;
                    }
                    return e.into_response();
                }
            },
            _ => {}
        }
    }

    let Some(upload) = stored else {
        return error_response(StatusCode::BAD_REQUEST, "Missing file field");
    };

    match videos_usecase
        .register_upload(auth.user_id, title, upload)
        .await
    {
        Ok(video) => {
            info!(user_id = %auth.user_id, video_id = %video.id, "videos: upload accepted");
            (StatusCode::CREATED, Json(video)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn list<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    match videos_usecase.list(auth.user_id).await {
        Ok(videos) => (StatusCode::OK, Json(videos)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_video<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    auth: AuthUser,
    Path(video_id): Path<Uuid>,
) -> impl IntoResponse
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    match videos_usecase.get(auth.user_id, video_id).await {
        Ok(video) => (StatusCode::OK, Json(video)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_video<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    auth: AuthUser,
    Path(video_id): Path<Uuid>,
) -> impl IntoResponse
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    match videos_usecase.delete(auth.user_id, video_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn process<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    auth: AuthUser,
    Path(video_id): Path<Uuid>,
    options: Option<Json<ProcessOptions>>,
) -> impl IntoResponse
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    let options = options.map(|Json(options)| options).unwrap_or_default();

    match Arc::clone(&videos_usecase)
        .process(auth.user_id, video_id, options)
        .await
    {
        Ok(accepted) => (StatusCode::ACCEPTED, Json(accepted)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn stream<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    auth: AuthUser,
    Path(video_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    match videos_usecase.stream_file(auth.user_id, video_id).await {
        Ok(file) => serve_file(file, &headers).await,
        Err(e) => e.into_response(),
    }
}

pub async fn thumbnail<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    auth: AuthUser,
    Path(video_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    match videos_usecase.thumbnail_file(auth.user_id, video_id).await {
        Ok(file) => serve_file(file, &headers).await,
        Err(e) => e.into_response(),
    }
}

pub async fn media_url<V, S, P, SP, VP>(
    State(videos_usecase): State<Arc<VideoUseCase<V, S, P, SP, VP>>>,
    auth: AuthUser,
    Path(video_id): Path<Uuid>,
) -> impl IntoResponse
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    match videos_usecase
        .media_url(auth.user_id, video_id, Utc::now())
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::config_model::MediaUrl, usecases::media_urls::MediaUrlSigner};
    use axum::{body::Body, http::Request};
    use crates::{
        domain::repositories::{
            plans::MockPlanRepository, scheduled_posts::MockScheduledPostRepository,
            subscriptions::MockSubscriptionRepository, video_processor::MockVideoProcessor,
            videos::MockVideoRepository,
        },
        infra::storage::local_storage::LocalVideoStorage,
    };
    use tower::ServiceExt;

    fn app(root: &std::path::Path, upload_limit: usize) -> Router {
        let mut videos = MockVideoRepository::new();
        videos.expect_create().never();
        let mut processor = MockVideoProcessor::new();
        processor.expect_probe_duration().never();

        router(
            Arc::new(VideoUseCase::new(
                Arc::new(videos),
                Arc::new(MockSubscriptionRepository::new()),
                Arc::new(MockPlanRepository::new()),
                Arc::new(MockScheduledPostRepository::new()),
                Arc::new(processor),
                LocalVideoStorage::new(root),
                MediaUrlSigner::new(
                    MediaUrl {
                        jwt_secret: "media-secret".to_string(),
                        ttl_seconds: 600,
                    },
                    "https://api.example.com",
                ),
                1,
            )),
            upload_limit,
        )
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_the_handler() {
        let dir = tempfile::tempdir().unwrap();
        let body = vec![0u8; 4096];

        let response = app(dir.path(), 1024)
            .oneshot(
                Request::post("/")
                    .header("content-type", "multipart/form-data; boundary=X")
                    .header("content-length", body.len())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
