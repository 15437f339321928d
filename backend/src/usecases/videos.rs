use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::http::StatusCode;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use crates::{
    domain::{
        entities::videos::{InsertVideoEntity, VideoEntity},
        repositories::{
            plans::PlanRepository, scheduled_posts::ScheduledPostRepository,
            subscriptions::SubscriptionRepository, video_processor::VideoProcessor,
            videos::VideoRepository,
        },
        value_objects::{
            enums::{subscription_statuses::SubscriptionStatus, video_statuses::VideoStatus},
            plans::PlanFeatures,
            videos::{
                MediaUrlResponse, ProcessAccepted, ProcessOptions, VideoDto, billable_minutes,
            },
        },
    },
    infra::storage::local_storage::{
        LocalVideoStorage, StoreError, content_type_for, extension_for,
    },
};
use futures_util::Stream;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    axum_http::error_responses::impl_error_response,
    usecases::media_urls::{MediaUrlError, MediaUrlSigner},
};

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video not found")]
    NotFound,
    #[error("{0}")]
    InvalidFile(String),
    #[error("file exceeds the {max_mb} MB upload limit")]
    TooLarge { max_mb: u64 },
    #[error("video limit of {0} reached for your plan")]
    VideoLimitReached(i64),
    #[error("video is already being processed")]
    AlreadyProcessing,
    #[error("video has scheduled posts; cancel them first")]
    HasPendingPosts,
    #[error("an active subscription is required")]
    SubscriptionRequired,
    #[error("not enough minutes left: {required} needed, {remaining} remaining")]
    QuotaExceeded { required: i32, remaining: i32 },
    #[error("no file is available for this video yet")]
    FileUnavailable,
    #[error("media link is invalid or expired")]
    InvalidMediaToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl VideoError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            VideoError::NotFound | VideoError::FileUnavailable => StatusCode::NOT_FOUND,
            VideoError::InvalidFile(_) => StatusCode::BAD_REQUEST,
            VideoError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            VideoError::VideoLimitReached(_)
            | VideoError::SubscriptionRequired
            | VideoError::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
            VideoError::AlreadyProcessing | VideoError::HasPendingPosts => StatusCode::CONFLICT,
            VideoError::InvalidMediaToken => StatusCode::UNAUTHORIZED,
            VideoError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl_error_response!(VideoError);

pub type UseCaseResult<T> = std::result::Result<T, VideoError>;

/// File written by `store_upload`, waiting for `register_upload` to create its row.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub video_id: Uuid,
    pub original_filename: String,
    pub mime_type: String,
    pub path: String,
    pub size_bytes: i64,
}

/// A file on disk the caller may serve.
#[derive(Debug, Clone, PartialEq)]
pub struct ServableFile {
    pub path: PathBuf,
    pub content_type: String,
}

pub struct VideoUseCase<V, S, P, SP, VP>
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    video_repo: Arc<V>,
    subscription_repo: Arc<S>,
    plan_repo: Arc<P>,
    scheduled_post_repo: Arc<SP>,
    processor: Arc<VP>,
    storage: LocalVideoStorage,
    media_urls: MediaUrlSigner,
    max_upload_mb: u64,
}

impl<V, S, P, SP, VP> VideoUseCase<V, S, P, SP, VP>
where
    V: VideoRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    VP: VideoProcessor + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        video_repo: Arc<V>,
        subscription_repo: Arc<S>,
        plan_repo: Arc<P>,
        scheduled_post_repo: Arc<SP>,
        processor: Arc<VP>,
        storage: LocalVideoStorage,
        media_urls: MediaUrlSigner,
        max_upload_mb: u64,
    ) -> Self {
        Self {
            video_repo,
            subscription_repo,
            plan_repo,
            scheduled_post_repo,
            processor,
            storage,
            media_urls,
            max_upload_mb,
        }
    }

    /// Streams an upload to disk after checking type and plan limits.
    pub async fn store_upload<St, E>(
        &self,
        user_id: Uuid,
        original_filename: &str,
        declared_mime: Option<&str>,
        stream: St,
    ) -> UseCaseResult<StoredUpload>
    where
        St: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mime_type = resolve_video_mime(original_filename, declared_mime).ok_or_else(|| {
            warn!(
                %user_id,
                original_filename,
                declared_mime = ?declared_mime,
                "videos: rejected non-video upload"
            );
            VideoError::InvalidFile("only video files can be uploaded".to_string())
        })?;

        let features = self.plan_features(user_id).await?;
        if let Some(max_videos) = features.as_ref().and_then(|f| f.max_videos) {
            let count = self.video_repo.count_for_user(user_id).await?;
            if count >= max_videos {
                warn!(%user_id, count, max_videos, "videos: video limit reached");
                return Err(VideoError::VideoLimitReached(max_videos));
            }
        }

        let max_mb = features
            .as_ref()
            .and_then(|f| f.max_upload_mb)
            .and_then(|mb| u64::try_from(mb).ok())
            .map_or(self.max_upload_mb, |mb| mb.min(self.max_upload_mb));

        let video_id = Uuid::new_v4();
        let path = self.storage.upload_path(
            user_id,
            video_id,
            &extension_for(original_filename, &mime_type),
        );

        let stored = self
            .storage
            .write_stream(&path, stream, max_mb * BYTES_PER_MB)
            .await
            .map_err(|err| match err {
                StoreError::TooLarge { .. } => {
                    warn!(%user_id, max_mb, "videos: upload too large");
                    VideoError::TooLarge { max_mb }
                }
                StoreError::Io(err) => {
                    error!(%user_id, error = ?err, "videos: failed to store upload");
                    VideoError::Internal(err)
                }
            })?;

        if stored.size_bytes == 0 {
            self.storage.remove_file(&stored.path).await;
            return Err(VideoError::InvalidFile("uploaded file is empty".to_string()));
        }

        Ok(StoredUpload {
            video_id,
            original_filename: original_filename.to_string(),
            mime_type,
            path: stored.path,
            size_bytes: stored.size_bytes,
        })
    }

    /// Probes the stored file and creates the `uploaded` row. The file is removed on failure.
    pub async fn register_upload(
        &self,
        user_id: Uuid,
        title: Option<String>,
        upload: StoredUpload,
    ) -> UseCaseResult<VideoDto> {
        let duration_seconds = match self.processor.probe_duration(&upload.path).await {
            Ok(duration) => duration,
            Err(err) => {
                warn!(
                    %user_id,
                    video_id = %upload.video_id,
                    error = ?err,
                    "videos: ffprobe could not read upload"
                );
                self.storage.remove_file(&upload.path).await;
                return Err(VideoError::InvalidFile(
                    "file is not a readable video".to_string(),
                ));
            }
        };

        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(&upload.original_filename));

        let created = self
            .video_repo
            .create(InsertVideoEntity {
                id: upload.video_id,
                user_id,
                title,
                original_filename: upload.original_filename,
                storage_path: upload.path.clone(),
                mime_type: upload.mime_type,
                size_bytes: upload.size_bytes,
                duration_seconds: Some(duration_seconds),
                status: VideoStatus::Uploaded.to_string(),
            })
            .await;

        match created {
            Ok(video) => {
                info!(
                    %user_id,
                    video_id = %video.id,
                    size_bytes = video.size_bytes,
                    duration_seconds,
                    "videos: upload registered"
                );
                Ok(VideoDto::from(video))
            }
            Err(err) => {
                error!(%user_id, db_error = ?err, "videos: failed to insert video");
                self.storage.remove_file(&upload.path).await;
                Err(VideoError::Internal(err))
            }
        }
    }

    /// Drops a stored file whose upload request failed before registration.
    pub async fn discard_upload(&self, upload: &StoredUpload) {
        self.storage.remove_file(&upload.path).await;
    }

    pub async fn list(&self, user_id: Uuid) -> UseCaseResult<Vec<VideoDto>> {
        let videos = self.video_repo.list_for_user(user_id).await.map_err(|err| {
            error!(%user_id, db_error = ?err, "videos: failed to list videos");
            VideoError::Internal(err)
        })?;
        Ok(videos.into_iter().map(VideoDto::from).collect())
    }

    pub async fn get(&self, user_id: Uuid, video_id: Uuid) -> UseCaseResult<VideoDto> {
        self.owned_video(user_id, video_id).await.map(VideoDto::from)
    }

    pub async fn delete(&self, user_id: Uuid, video_id: Uuid) -> UseCaseResult<()> {
        let video = self.owned_video(user_id, video_id).await?;

        if self
            .scheduled_post_repo
            .has_pending_for_video(video_id)
            .await?
        {
            warn!(%user_id, %video_id, "videos: delete refused, posts pending");
            return Err(VideoError::HasPendingPosts);
        }
        if VideoStatus::from_str(&video.status) == VideoStatus::Processing {
            return Err(VideoError::AlreadyProcessing);
        }

        self.video_repo.delete(video_id).await?;

        let files = [
            Some(video.storage_path),
            video.processed_path,
            video.thumbnail_path,
        ];
        self.storage.remove_files(files.into_iter().flatten()).await;

        info!(%user_id, %video_id, "videos: video deleted");
        Ok(())
    }

    /// Checks quota, flips the video to `processing` and runs FFmpeg in the background.
    pub async fn process(
        self: Arc<Self>,
        user_id: Uuid,
        video_id: Uuid,
        options: ProcessOptions,
    ) -> UseCaseResult<ProcessAccepted> {
        let (video, job_id) = self.start_processing(user_id, video_id, &options).await?;

        let this = Arc::clone(&self);
        let spawned_job_id = job_id.clone();
        tokio::spawn(async move {
            this.run_processing_job(video, options, &spawned_job_id)
                .await;
        });

        Ok(ProcessAccepted {
            video_id,
            job_id,
            status: VideoStatus::Processing,
        })
    }

    pub async fn start_processing(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        options: &ProcessOptions,
    ) -> UseCaseResult<(VideoEntity, String)> {
        validate_options(options)?;

        let video = self.owned_video(user_id, video_id).await?;
        if VideoStatus::from_str(&video.status) == VideoStatus::Processing {
            return Err(VideoError::AlreadyProcessing);
        }
        // Scheduled posts publish the current output; it must not change under them.
        if self
            .scheduled_post_repo
            .has_pending_for_video(video_id)
            .await?
        {
            warn!(%user_id, %video_id, "videos: reprocess refused, posts pending");
            return Err(VideoError::HasPendingPosts);
        }

        let source_duration = match video.duration_seconds {
            Some(duration) => duration,
            None => self.processor.probe_duration(&video.storage_path).await?,
        };
        let required = billable_minutes(options.output_duration(source_duration));

        let subscription = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await?
            .filter(|s| SubscriptionStatus::from_str(&s.status).grants_access())
            .ok_or_else(|| {
                warn!(%user_id, %video_id, "videos: processing without active subscription");
                VideoError::SubscriptionRequired
            })?;

        if subscription.minutes_used + required > subscription.minutes_allowed {
            let remaining = (subscription.minutes_allowed - subscription.minutes_used).max(0);
            warn!(
                %user_id,
                %video_id,
                required,
                remaining,
                "videos: minutes quota exceeded"
            );
            return Err(VideoError::QuotaExceeded {
                required,
                remaining,
            });
        }

        let job_id = Uuid::new_v4().to_string();
        if !self.video_repo.mark_processing(video_id, &job_id).await? {
            return Err(VideoError::AlreadyProcessing);
        }

        info!(%user_id, %video_id, %job_id, required, "videos: processing started");
        Ok((video, job_id))
    }

    /// Runs FFmpeg for a claimed video and records the outcome. Never returns an error:
    /// every failure is written to the video row.
    pub async fn run_processing_job(
        &self,
        video: VideoEntity,
        options: ProcessOptions,
        job_id: &str,
    ) -> VideoStatus {
        let output = self.storage.processed_path(video.user_id, video.id);
        let thumbnail = self.storage.thumbnail_path(video.user_id, video.id);

        let result = self
            .processor
            .process(
                &video.storage_path,
                &output.to_string_lossy(),
                &thumbnail.to_string_lossy(),
                options,
            )
            .await;

        let processed = match result {
            Ok(processed) => processed,
            Err(err) => {
                error!(video_id = %video.id, job_id, error = ?err, "videos: processing failed");
                self.storage.remove_file(&output).await;
                if let Err(db_err) = self
                    .video_repo
                    .mark_failed(video.id, &format!("{err:#}"))
                    .await
                {
                    error!(video_id = %video.id, db_error = ?db_err, "videos: failed to record failure");
                }
                return VideoStatus::Failed;
            }
        };

        let minutes = billable_minutes(processed.duration_seconds);
        if let Err(err) = self.video_repo.mark_ready(video.id, processed).await {
            error!(video_id = %video.id, db_error = ?err, "videos: failed to mark ready");
            if let Err(db_err) = self
                .video_repo
                .mark_failed(video.id, "processed output could not be recorded")
                .await
            {
                // Still processing; the stale job sweep fails it later.
                error!(video_id = %video.id, db_error = ?db_err, "videos: failed to record failure");
            }
            return VideoStatus::Failed;
        }

        if let Err(err) = self
            .subscription_repo
            .add_minutes_used(video.user_id, minutes)
            .await
        {
            error!(
                user_id = %video.user_id,
                video_id = %video.id,
                minutes,
                db_error = ?err,
                "videos: failed to record usage"
            );
        }

        info!(
            user_id = %video.user_id,
            video_id = %video.id,
            job_id,
            minutes,
            "videos: processing finished"
        );
        VideoStatus::Ready
    }

    pub async fn stream_file(&self, user_id: Uuid, video_id: Uuid) -> UseCaseResult<ServableFile> {
        let video = self.owned_video(user_id, video_id).await?;
        servable(video.playable_path(), &video.mime_type)
    }

    pub async fn thumbnail_file(
        &self,
        user_id: Uuid,
        video_id: Uuid,
    ) -> UseCaseResult<ServableFile> {
        let video = self.owned_video(user_id, video_id).await?;
        let path = video.thumbnail_path.ok_or(VideoError::FileUnavailable)?;
        servable(&path, "image/jpeg")
    }

    pub async fn media_url(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<MediaUrlResponse> {
        let video = self.owned_video(user_id, video_id).await?;
        let url = self.media_urls.url(user_id, video.id, now)?;
        Ok(MediaUrlResponse {
            url,
            expires_at: now + Duration::seconds(self.media_urls.ttl_seconds()),
        })
    }

    /// Resolves a signed media link without a session.
    pub async fn media_file(
        &self,
        video_id: Uuid,
        token: &str,
        now: DateTime<Utc>,
    ) -> UseCaseResult<ServableFile> {
        let claims = self
            .media_urls
            .verify(token, video_id, now)
            .map_err(|err: MediaUrlError| {
                warn!(%video_id, reason = %err, "videos: media token rejected");
                VideoError::InvalidMediaToken
            })?;

        let video = self
            .video_repo
            .find_by_id(video_id)
            .await?
            .ok_or(VideoError::NotFound)?;

        if claims.uid != video.user_id.to_string() {
            warn!(%video_id, "videos: media token owner mismatch");
            return Err(VideoError::InvalidMediaToken);
        }

        servable(video.playable_path(), &video.mime_type)
    }

    async fn owned_video(&self, user_id: Uuid, video_id: Uuid) -> UseCaseResult<VideoEntity> {
        self.video_repo
            .find_for_user(user_id, video_id)
            .await
            .map_err(|err| {
                error!(%user_id, %video_id, db_error = ?err, "videos: failed to load video");
                VideoError::Internal(err)
            })?
            .ok_or_else(|| {
                warn!(%user_id, %video_id, "videos: video not found");
                VideoError::NotFound
            })
    }

    async fn plan_features(&self, user_id: Uuid) -> UseCaseResult<Option<PlanFeatures>> {
        let Some(subscription) = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await?
            .filter(|s| SubscriptionStatus::from_str(&s.status).grants_access())
        else {
            return Ok(None);
        };

        let plan = self.plan_repo.find_by_id(subscription.plan_id).await?;
        Ok(plan.map(|plan| plan.features))
    }
}

fn servable(path: &str, stored_mime: &str) -> UseCaseResult<ServableFile> {
    let path = PathBuf::from(path);
    if !path.is_file() {
        warn!(path = %path.display(), "videos: file missing on disk");
        return Err(VideoError::FileUnavailable);
    }

    // Processed outputs are always MP4 even if the upload was not.
    let guessed = content_type_for(&path);
    let content_type = if guessed == "application/octet-stream" {
        stored_mime.to_string()
    } else {
        guessed
    };

    Ok(ServableFile { path, content_type })
}

/// Picks the MIME type of an upload, trusting a declared `video/*` type and otherwise
/// guessing from the filename.
pub fn resolve_video_mime(original_filename: &str, declared: Option<&str>) -> Option<String> {
    let declared = declared.map(str::trim).filter(|m| !m.is_empty());
    if let Some(mime) = declared.filter(|m| m.starts_with("video/")) {
        return Some(mime.to_string());
    }

    // Browsers send octet-stream for containers they do not recognise.
    if declared.is_some_and(|m| m != "application/octet-stream") {
        return None;
    }

    mime_guess::from_path(original_filename)
        .first_raw()
        .filter(|m| m.starts_with("video/"))
        .map(str::to_string)
}

fn validate_options(options: &ProcessOptions) -> UseCaseResult<()> {
    let start = options.trim_start_seconds.unwrap_or(0.0);
    if start < 0.0 {
        return Err(VideoError::InvalidFile(
            "trim_start_seconds must not be negative".to_string(),
        ));
    }
    if let Some(end) = options.trim_end_seconds {
        if end <= start {
            return Err(VideoError::InvalidFile(
                "trim_end_seconds must be after trim_start_seconds".to_string(),
            ));
        }
    }
    if options.width == Some(0) || options.height == Some(0) {
        return Err(VideoError::InvalidFile(
            "width and height must be positive".to_string(),
        ));
    }
    Ok(())
}

fn default_title(original_filename: &str) -> String {
    Path::new(original_filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
        .map_or_else(|| "Untitled video".to_string(), str::to_string)
}
