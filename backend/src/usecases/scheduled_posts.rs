use std::{str::FromStr, sync::Arc};

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use crates::domain::{
    entities::scheduled_posts::InsertScheduledPostEntity,
    repositories::{
        scheduled_posts::ScheduledPostRepository, social_accounts::SocialAccountRepository,
        videos::VideoRepository,
    },
    value_objects::{
        enums::{platforms::Platform, post_statuses::PostStatus, video_statuses::VideoStatus},
        scheduled_posts::{CreateScheduledPostRequest, ScheduledPostDto},
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::axum_http::error_responses::impl_error_response;

pub const YOUTUBE_MAX_TITLE_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ScheduledPostError {
    #[error("{0}")]
    Validation(String),
    #[error("video not found")]
    VideoNotFound,
    #[error("video must finish processing before it can be scheduled")]
    VideoNotReady,
    #[error("social account not found")]
    AccountNotFound,
    #[error("scheduled post not found")]
    PostNotFound,
    #[error("only scheduled posts can be cancelled")]
    NotCancellable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ScheduledPostError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScheduledPostError::Validation(_) | ScheduledPostError::VideoNotReady => {
                StatusCode::BAD_REQUEST
            }
            ScheduledPostError::VideoNotFound
            | ScheduledPostError::AccountNotFound
            | ScheduledPostError::PostNotFound => StatusCode::NOT_FOUND,
            ScheduledPostError::NotCancellable => StatusCode::CONFLICT,
            ScheduledPostError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl_error_response!(ScheduledPostError);

pub type UseCaseResult<T> = std::result::Result<T, ScheduledPostError>;

pub struct ScheduledPostUseCase<SP, V, A>
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    scheduled_post_repo: Arc<SP>,
    video_repo: Arc<V>,
    account_repo: Arc<A>,
}

impl<SP, V, A> ScheduledPostUseCase<SP, V, A>
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    pub fn new(scheduled_post_repo: Arc<SP>, video_repo: Arc<V>, account_repo: Arc<A>) -> Self {
        Self {
            scheduled_post_repo,
            video_repo,
            account_repo,
        }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        request: CreateScheduledPostRequest,
        now: DateTime<Utc>,
    ) -> UseCaseResult<ScheduledPostDto> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(ScheduledPostError::Validation(
                "title must not be empty".to_string(),
            ));
        }
        if request.scheduled_at <= now {
            return Err(ScheduledPostError::Validation(
                "scheduled_at must be in the future".to_string(),
            ));
        }

        let video = self
            .video_repo
            .find_for_user(user_id, request.video_id)
            .await?
            .ok_or(ScheduledPostError::VideoNotFound)?;
        if VideoStatus::from_str(&video.status) != VideoStatus::Ready {
            warn!(%user_id, video_id = %video.id, status = %video.status, "scheduled_posts: video not ready");
            return Err(ScheduledPostError::VideoNotReady);
        }

        let account = self
            .account_repo
            .find_for_user(user_id, request.social_account_id)
            .await?
            .ok_or(ScheduledPostError::AccountNotFound)?;

        if Platform::from_str(&account.platform).ok() == Some(Platform::YouTube)
            && title.chars().count() > YOUTUBE_MAX_TITLE_CHARS
        {
            return Err(ScheduledPostError::Validation(format!(
                "YouTube titles are limited to {} characters",
                YOUTUBE_MAX_TITLE_CHARS
            )));
        }

        let description = request
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let post = self
            .scheduled_post_repo
            .create(InsertScheduledPostEntity {
                user_id,
                video_id: video.id,
                social_account_id: account.id,
                title,
                description,
                scheduled_at: request.scheduled_at,
                status: PostStatus::Scheduled.to_string(),
            })
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "scheduled_posts: failed to create post");
                ScheduledPostError::Internal(err)
            })?;

        info!(
            %user_id,
            post_id = %post.id,
            platform = %account.platform,
            scheduled_at = %post.scheduled_at,
            "scheduled_posts: post scheduled"
        );
        Ok(ScheduledPostDto::from(post))
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        status: Option<&str>,
    ) -> UseCaseResult<Vec<ScheduledPostDto>> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(PostStatus::from_str(raw).ok_or_else(|| {
                ScheduledPostError::Validation(format!("unknown status: {}", raw))
            })?),
            None => None,
        };

        let posts = self
            .scheduled_post_repo
            .list_for_user(user_id, status)
            .await?;
        Ok(posts.into_iter().map(ScheduledPostDto::from).collect())
    }

    pub async fn get(&self, user_id: Uuid, post_id: Uuid) -> UseCaseResult<ScheduledPostDto> {
        self.scheduled_post_repo
            .find_for_user(user_id, post_id)
            .await?
            .map(ScheduledPostDto::from)
            .ok_or(ScheduledPostError::PostNotFound)
    }

    /// Removes a post that has not been picked up yet.
    pub async fn cancel(&self, user_id: Uuid, post_id: Uuid) -> UseCaseResult<()> {
        let post = self
            .scheduled_post_repo
            .find_for_user(user_id, post_id)
            .await?
            .ok_or(ScheduledPostError::PostNotFound)?;

        if PostStatus::from_str(&post.status) != Some(PostStatus::Scheduled) {
            return Err(ScheduledPostError::NotCancellable);
        }

        // The publish loop may claim the post between the read and the delete.
        if !self.scheduled_post_repo.delete_if_scheduled(post.id).await? {
            warn!(%user_id, %post_id, "scheduled_posts: post was claimed before cancel");
            return Err(ScheduledPostError::NotCancellable);
        }

        info!(%user_id, %post_id, "scheduled_posts: post cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crates::domain::{
        entities::{
            scheduled_posts::ScheduledPostEntity, social_accounts::SocialAccountEntity,
            videos::VideoEntity,
        },
        repositories::{
            scheduled_posts::MockScheduledPostRepository,
            social_accounts::MockSocialAccountRepository, videos::MockVideoRepository,
        },
    };
    use mockall::predicate::eq;

    type TestUseCase = ScheduledPostUseCase<
        MockScheduledPostRepository,
        MockVideoRepository,
        MockSocialAccountRepository,
    >;

    fn build(
        posts: MockScheduledPostRepository,
        videos: MockVideoRepository,
        accounts: MockSocialAccountRepository,
    ) -> TestUseCase {
        ScheduledPostUseCase::new(Arc::new(posts), Arc::new(videos), Arc::new(accounts))
    }

    fn video(user_id: Uuid, status: VideoStatus) -> VideoEntity {
        let now = Utc::now();
        VideoEntity {
            id: Uuid::new_v4(),
            user_id,
            title: "clip".to_string(),
            original_filename: "clip.mp4".to_string(),
            storage_path: "/data/clip.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            size_bytes: 10,
            duration_seconds: Some(10.0),
            status: status.to_string(),
            job_id: None,
            processed_path: None,
            thumbnail_path: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn account(user_id: Uuid, platform: Platform) -> SocialAccountEntity {
        let now = Utc::now();
        SocialAccountEntity {
            id: Uuid::new_v4(),
            user_id,
            platform: platform.to_string(),
            platform_account_id: "acct".to_string(),
            account_name: None,
            access_token_encrypted: "x".to_string(),
            refresh_token_encrypted: None,
            token_expires_at: None,
            scopes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn post(user_id: Uuid, status: PostStatus) -> ScheduledPostEntity {
        let now = Utc::now();
        ScheduledPostEntity {
            id: Uuid::new_v4(),
            user_id,
            video_id: Uuid::new_v4(),
            social_account_id: Uuid::new_v4(),
            title: "title".to_string(),
            description: None,
            scheduled_at: now,
            status: status.to_string(),
            platform_post_id: None,
            error: None,
            attempted_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(title: &str, scheduled_at: DateTime<Utc>) -> CreateScheduledPostRequest {
        CreateScheduledPostRequest {
            video_id: Uuid::new_v4(),
            social_account_id: Uuid::new_v4(),
            title: title.to_string(),
            description: Some("  ".to_string()),
            scheduled_at,
        }
    }

    #[tokio::test]
    async fn creates_scheduled_post_for_ready_video() {
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let mut videos = MockVideoRepository::new();
        videos
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(video(uid, VideoStatus::Ready))));
        let mut accounts = MockSocialAccountRepository::new();
        accounts
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(account(uid, Platform::TikTok))));
        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_create()
            .withf(move |insert| {
                insert.user_id == user_id
                    && insert.status == "SCHEDULED"
                    && insert.title == "Launch day"
                    && insert.description.is_none()
            })
            .times(1)
            .returning(|insert| {
                let mut created = post(insert.user_id, PostStatus::Scheduled);
                created.title = insert.title;
                created.scheduled_at = insert.scheduled_at;
                Ok(created)
            });

        let dto = build(posts, videos, accounts)
            .create(user_id, request(" Launch day ", now + Duration::hours(1)), now)
            .await
            .unwrap();

        assert_eq!(dto.status, PostStatus::Scheduled);
        assert_eq!(dto.title, "Launch day");
    }

    #[tokio::test]
    async fn rejects_past_schedule_and_empty_title() {
        let now = Utc::now();
        let usecase = build(
            MockScheduledPostRepository::new(),
            MockVideoRepository::new(),
            MockSocialAccountRepository::new(),
        );

        let err = usecase
            .create(Uuid::new_v4(), request("ok", now - Duration::minutes(1)), now)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = usecase
            .create(Uuid::new_v4(), request("   ", now + Duration::hours(1)), now)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_video_that_is_not_ready() {
        let now = Utc::now();
        let mut videos = MockVideoRepository::new();
        videos
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(video(uid, VideoStatus::Processing))));

        let err = build(
            MockScheduledPostRepository::new(),
            videos,
            MockSocialAccountRepository::new(),
        )
        .create(Uuid::new_v4(), request("t", now + Duration::hours(1)), now)
        .await
        .unwrap_err();

        assert!(matches!(err, ScheduledPostError::VideoNotReady));
    }

    #[tokio::test]
    async fn youtube_titles_are_capped() {
        let now = Utc::now();
        let mut videos = MockVideoRepository::new();
        videos
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(video(uid, VideoStatus::Ready))));
        let mut accounts = MockSocialAccountRepository::new();
        accounts
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(account(uid, Platform::YouTube))));
        let mut posts = MockScheduledPostRepository::new();
        posts.expect_create().never();

        let long_title = "x".repeat(YOUTUBE_MAX_TITLE_CHARS + 1);
        let err = build(posts, videos, accounts)
            .create(Uuid::new_v4(), request(&long_title, now + Duration::hours(1)), now)
            .await
            .unwrap_err();

        assert!(matches!(err, ScheduledPostError::Validation(_)));
    }

    #[tokio::test]
    async fn someone_elses_account_is_not_found() {
        let now = Utc::now();
        let mut videos = MockVideoRepository::new();
        videos
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(video(uid, VideoStatus::Ready))));
        let mut accounts = MockSocialAccountRepository::new();
        accounts.expect_find_for_user().returning(|_, _| Ok(None));

        let err = build(MockScheduledPostRepository::new(), videos, accounts)
            .create(Uuid::new_v4(), request("t", now + Duration::hours(1)), now)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_filters_by_parsed_status() {
        let user_id = Uuid::new_v4();
        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_list_for_user()
            .with(eq(user_id), eq(Some(PostStatus::Failed)))
            .returning(|uid, _| Ok(vec![post(uid, PostStatus::Failed)]));
        let usecase = build(
            posts,
            MockVideoRepository::new(),
            MockSocialAccountRepository::new(),
        );

        let listed = usecase.list(user_id, Some("failed")).await.unwrap();
        assert_eq!(listed.len(), 1);

        let err = usecase.list(user_id, Some("queued")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_only_while_scheduled() {
        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(post(uid, PostStatus::Processing))));
        posts.expect_delete_if_scheduled().never();

        let err = build(
            posts,
            MockVideoRepository::new(),
            MockSocialAccountRepository::new(),
        )
        .cancel(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn cancel_loses_race_with_publisher() {
        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(post(uid, PostStatus::Scheduled))));
        posts
            .expect_delete_if_scheduled()
            .times(1)
            .returning(|_| Ok(false));

        let err = build(
            posts,
            MockVideoRepository::new(),
            MockSocialAccountRepository::new(),
        )
        .cancel(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();

        assert!(matches!(err, ScheduledPostError::NotCancellable));
    }

    #[tokio::test]
    async fn cancel_deletes_scheduled_post() {
        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_find_for_user()
            .returning(|uid, _| Ok(Some(post(uid, PostStatus::Scheduled))));
        posts
            .expect_delete_if_scheduled()
            .times(1)
            .returning(|_| Ok(true));

        build(
            posts,
            MockVideoRepository::new(),
            MockSocialAccountRepository::new(),
        )
        .cancel(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap();
    }
}
