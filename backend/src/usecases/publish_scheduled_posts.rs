use std::{str::FromStr, sync::Arc};

use anyhow::{Context, Result, anyhow};
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use crates::{
    domain::{
        entities::scheduled_posts::ScheduledPostEntity,
        repositories::{
            scheduled_posts::ScheduledPostRepository, social_accounts::SocialAccountRepository,
            videos::VideoRepository,
        },
        value_objects::{
            enums::{platforms::Platform, video_statuses::VideoStatus},
            scheduled_posts::{PublishRequest, PublishSummary},
        },
    },
    social::platform_client::PlatformRegistry,
};
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    axum_http::error_responses::impl_error_response,
    usecases::{media_urls::MediaUrlSigner, social_tokens::SocialTokenService},
};

pub const STALE_ATTEMPT_ERROR: &str = "publish attempt timed out";
pub const STALE_VIDEO_ERROR: &str = "processing was interrupted";
const MAX_ERROR_CHARS: usize = 1000;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PublishError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PublishError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl_error_response!(PublishError);

#[derive(Debug, Clone, Copy)]
pub struct PublishSettings {
    pub batch_limit: i64,
    pub stale_after: Duration,
    /// A `processing` video untouched for this long has lost its FFmpeg job.
    pub video_stale_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostOutcome {
    Skipped,
    Published,
    Failed,
}

/// Walks due scheduled posts and publishes each one once.
pub struct PublishScheduledPostsUseCase<SP, V, A>
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    scheduled_post_repo: Arc<SP>,
    video_repo: Arc<V>,
    account_repo: Arc<A>,
    tokens: Arc<SocialTokenService<A>>,
    platforms: Arc<PlatformRegistry>,
    media_urls: MediaUrlSigner,
    settings: PublishSettings,
}

impl<SP, V, A> PublishScheduledPostsUseCase<SP, V, A>
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    pub fn new(
        scheduled_post_repo: Arc<SP>,
        video_repo: Arc<V>,
        account_repo: Arc<A>,
        tokens: Arc<SocialTokenService<A>>,
        platforms: Arc<PlatformRegistry>,
        media_urls: MediaUrlSigner,
        settings: PublishSettings,
    ) -> Self {
        Self {
            scheduled_post_repo,
            video_repo,
            account_repo,
            tokens,
            platforms,
            media_urls,
            settings,
        }
    }

    pub async fn run_due_posts(&self, now: DateTime<Utc>) -> Result<PublishSummary, PublishError> {
        let stale_failed = self
            .scheduled_post_repo
            .fail_stale_processing(now - self.settings.stale_after, STALE_ATTEMPT_ERROR)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "publish: failed to sweep stale attempts");
                PublishError::Internal(err)
            })?;
        if stale_failed > 0 {
            warn!(stale_failed, "publish: failed stale processing posts");
        }

        let stale_videos_failed = match self
            .video_repo
            .fail_stale_processing(now - self.settings.video_stale_after, STALE_VIDEO_ERROR)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                error!(db_error = ?err, "publish: failed to sweep stale video jobs");
                0
            }
        };
        if stale_videos_failed > 0 {
            warn!(stale_videos_failed, "publish: failed stale processing videos");
        }

        let due = self
            .scheduled_post_repo
            .find_due(now, self.settings.batch_limit)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "publish: failed to load due posts");
                PublishError::Internal(err)
            })?;

        // Every post is attempted; one failure never stops the others.
        let outcomes = join_all(due.iter().map(|post| self.attempt(post, now))).await;

        let count = |wanted: PostOutcome| outcomes.iter().filter(|o| **o == wanted).count();
        let skipped = count(PostOutcome::Skipped);
        let summary = PublishSummary {
            due: due.len(),
            claimed: due.len() - skipped,
            published: count(PostOutcome::Published),
            failed: count(PostOutcome::Failed),
            skipped,
            stale_failed,
            stale_videos_failed,
        };

        info!(
            due = summary.due,
            claimed = summary.claimed,
            published = summary.published,
            failed = summary.failed,
            skipped = summary.skipped,
            stale_failed = summary.stale_failed,
            stale_videos_failed = summary.stale_videos_failed,
            "publish: run finished"
        );
        Ok(summary)
    }

    async fn attempt(&self, post: &ScheduledPostEntity, now: DateTime<Utc>) -> PostOutcome {
        match self.scheduled_post_repo.claim(post.id, now).await {
            Ok(true) => {}
            Ok(false) => {
                info!(post_id = %post.id, "publish: post already claimed");
                return PostOutcome::Skipped;
            }
            Err(err) => {
                error!(post_id = %post.id, db_error = ?err, "publish: failed to claim post");
                return PostOutcome::Skipped;
            }
        }

        match self.publish_claimed(post, now).await {
            Ok(platform_post_id) => {
                match self
                    .scheduled_post_repo
                    .mark_published(post.id, &platform_post_id, Utc::now())
                    .await
                {
                    Ok(true) => {
                        info!(post_id = %post.id, %platform_post_id, "publish: post published");
                        PostOutcome::Published
                    }
                    Ok(false) => {
                        // The row left PROCESSING underneath us, usually through the stale sweep.
                        warn!(
                            post_id = %post.id,
                            %platform_post_id,
                            "publish: post went live but its row was no longer processing"
                        );
                        PostOutcome::Failed
                    }
                    Err(err) => {
                        error!(
                            post_id = %post.id,
                            %platform_post_id,
                            db_error = ?err,
                            "publish: failed to record published post"
                        );
                        self.fail(
                            post,
                            &format!("published as {platform_post_id} but could not record it: {err:#}"),
                        )
                        .await
                    }
                }
            }
            Err(err) => {
                warn!(post_id = %post.id, error = ?err, "publish: post failed");
                self.fail(post, &format!("{err:#}")).await
            }
        }
    }

    async fn fail(&self, post: &ScheduledPostEntity, message: &str) -> PostOutcome {
        let message = truncate(message, MAX_ERROR_CHARS);
        match self.scheduled_post_repo.mark_failed(post.id, &message).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(post_id = %post.id, error = %message, "publish: post was no longer processing");
            }
            Err(err) => {
                // Left in PROCESSING; the stale sweep fails it on a later run.
                error!(post_id = %post.id, db_error = ?err, "publish: failed to record failure");
            }
        }
        PostOutcome::Failed
    }

    async fn publish_claimed(&self, post: &ScheduledPostEntity, now: DateTime<Utc>) -> Result<String> {
        let video = self
            .video_repo
            .find_by_id(post.video_id)
            .await?
            .ok_or_else(|| anyhow!("video no longer exists"))?;
        if VideoStatus::from_str(&video.status) != VideoStatus::Ready {
            return Err(anyhow!("video is not ready (status {})", video.status));
        }

        let account = self
            .account_repo
            .find_by_id(post.social_account_id)
            .await?
            .ok_or_else(|| anyhow!("social account was disconnected"))?;

        let platform = Platform::from_str(&account.platform).map_err(|err| anyhow!(err))?;
        let client = self
            .platforms
            .get(platform)
            .ok_or_else(|| anyhow!("{platform} publishing is not configured"))?;

        let access_token = self.tokens.valid_access_token(&account, now).await?;
        let media_url = self
            .media_urls
            .url(post.user_id, video.id, now)
            .context("failed to sign media url")?;

        let request = PublishRequest {
            title: post.title.clone(),
            description: post.description.clone(),
            file_path: video.playable_path().to_string(),
            mime_type: video.mime_type.clone(),
            media_url,
        };

        info!(
            post_id = %post.id,
            %platform,
            account_id = %account.id,
            "publish: publishing post"
        );
        client
            .publish(&access_token, &account.platform_account_id, request)
            .await
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_model::MediaUrl;
    use crates::{
        domain::{
            entities::{social_accounts::SocialAccountEntity, videos::VideoEntity},
            repositories::{
                scheduled_posts::MockScheduledPostRepository,
                social_accounts::MockSocialAccountRepository, videos::MockVideoRepository,
            },
            value_objects::enums::post_statuses::PostStatus,
        },
        infra::crypto::token_cipher::TokenCipher,
        social::platform_client::MockSocialPlatformClient,
    };
    use mockall::predicate::eq;
    use uuid::Uuid;

    type TestUseCase = PublishScheduledPostsUseCase<
        MockScheduledPostRepository,
        MockVideoRepository,
        MockSocialAccountRepository,
    >;

    fn cipher() -> Arc<TokenCipher> {
        Arc::new(TokenCipher::from_bytes(&[9u8; 32]).unwrap())
    }

    fn build(
        posts: MockScheduledPostRepository,
        videos: MockVideoRepository,
        accounts: MockSocialAccountRepository,
        client: Option<MockSocialPlatformClient>,
        cipher: Arc<TokenCipher>,
    ) -> TestUseCase {
        let accounts = Arc::new(accounts);
        let mut registry = PlatformRegistry::new();
        if let Some(client) = client {
            registry = registry.register(Arc::new(client));
        }
        let registry = Arc::new(registry);
        let tokens = Arc::new(SocialTokenService::new(
            Arc::clone(&accounts),
            cipher,
            Arc::clone(&registry),
        ));

        PublishScheduledPostsUseCase::new(
            Arc::new(posts),
            Arc::new(videos),
            accounts,
            tokens,
            registry,
            MediaUrlSigner::new(
                MediaUrl {
                    jwt_secret: "media".to_string(),
                    ttl_seconds: 3600,
                },
                "https://api.example.com",
            ),
            PublishSettings {
                batch_limit: 50,
                stale_after: Duration::minutes(30),
                video_stale_after: Duration::hours(2),
            },
        )
    }

    fn due_post(title: &str) -> ScheduledPostEntity {
        let now = Utc::now();
        ScheduledPostEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            video_id: Uuid::new_v4(),
            social_account_id: Uuid::new_v4(),
            title: title.to_string(),
            description: Some("desc".to_string()),
            scheduled_at: now - Duration::minutes(1),
            status: PostStatus::Scheduled.to_string(),
            platform_post_id: None,
            error: None,
            attempted_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn idle_videos() -> MockVideoRepository {
        let mut videos = MockVideoRepository::new();
        videos
            .expect_fail_stale_processing()
            .returning(|_, _| Ok(0));
        videos
    }

    fn ready_videos() -> MockVideoRepository {
        let mut videos = idle_videos();
        videos.expect_find_by_id().returning(|id| {
            let now = Utc::now();
            Ok(Some(VideoEntity {
                id,
                user_id: Uuid::new_v4(),
                title: "clip".to_string(),
                original_filename: "clip.mp4".to_string(),
                storage_path: "/data/u/clip.mp4".to_string(),
                mime_type: "video/mp4".to_string(),
                size_bytes: 10,
                duration_seconds: Some(10.0),
                status: VideoStatus::Ready.to_string(),
                job_id: None,
                processed_path: Some("/data/u/clip-processed.mp4".to_string()),
                thumbnail_path: None,
                error: None,
                created_at: now,
                updated_at: now,
            }))
        });
        videos
    }

    fn accounts_for(cipher: &Arc<TokenCipher>, platform: Platform) -> MockSocialAccountRepository {
        let access = cipher.encrypt("plain-access").unwrap();
        let mut accounts = MockSocialAccountRepository::new();
        accounts.expect_find_by_id().returning(move |id| {
            let now = Utc::now();
            Ok(Some(SocialAccountEntity {
                id,
                user_id: Uuid::new_v4(),
                platform: platform.to_string(),
                platform_account_id: "channel-1".to_string(),
                account_name: None,
                access_token_encrypted: access.clone(),
                refresh_token_encrypted: None,
                token_expires_at: None,
                scopes: None,
                created_at: now,
                updated_at: now,
            }))
        });
        accounts
    }

    fn platform_client(platform: Platform) -> MockSocialPlatformClient {
        let mut client = MockSocialPlatformClient::new();
        client.expect_platform().return_const(platform);
        client.expect_supports_refresh().return_const(true);
        client
    }

    fn no_stale(posts: &mut MockScheduledPostRepository) {
        posts
            .expect_fail_stale_processing()
            .returning(|_, _| Ok(0));
    }

    #[tokio::test]
    async fn due_post_is_claimed_published_and_recorded() {
        let cipher = cipher();
        let post = due_post("Launch");
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts
            .expect_find_due()
            .with(mockall::predicate::always(), eq(50))
            .returning(move |_, _| Ok(vec![post.clone()]));
        posts
            .expect_claim()
            .with(eq(post_id), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(true));
        posts
            .expect_mark_published()
            .withf(move |id, platform_post_id, _| *id == post_id && platform_post_id == "yt-123")
            .times(1)
            .returning(|_, _, _| Ok(true));
        posts.expect_mark_failed().never();

        let mut client = platform_client(Platform::YouTube);
        client
            .expect_publish()
            .withf(|token, account, request| {
                token == "plain-access"
                    && account == "channel-1"
                    && request.title == "Launch"
                    && request.file_path == "/data/u/clip-processed.mp4"
                    && request.media_url.contains("/api/v1/media/")
            })
            .times(1)
            .returning(|_, _, _| Ok("yt-123".to_string()));

        let summary = build(
            posts,
            ready_videos(),
            accounts_for(&cipher, Platform::YouTube),
            Some(client),
            cipher,
        )
        .run_due_posts(Utc::now())
        .await
        .unwrap();

        assert_eq!(
            summary,
            PublishSummary {
                due: 1,
                claimed: 1,
                published: 1,
                failed: 0,
                skipped: 0,
                stale_failed: 0,
                stale_videos_failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_other_posts() {
        let cipher = cipher();
        let good = due_post("good");
        let bad = due_post("bad");
        let good_id = good.id;
        let bad_id = bad.id;

        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts
            .expect_find_due()
            .returning(move |_, _| Ok(vec![bad.clone(), good.clone()]));
        posts.expect_claim().times(2).returning(|_, _| Ok(true));
        posts
            .expect_mark_published()
            .withf(move |id, _, _| *id == good_id)
            .times(1)
            .returning(|_, _, _| Ok(true));
        posts
            .expect_mark_failed()
            .withf(move |id, error| *id == bad_id && error.contains("quota exceeded"))
            .times(1)
            .returning(|_, _| Ok(true));

        let mut client = platform_client(Platform::TikTok);
        client.expect_publish().returning(|_, _, request| {
            if request.title == "bad" {
                Err(anyhow!("tiktok: quota exceeded"))
            } else {
                Ok("publish-id".to_string())
            }
        });

        let summary = build(
            posts,
            ready_videos(),
            accounts_for(&cipher, Platform::TikTok),
            Some(client),
            cipher,
        )
        .run_due_posts(Utc::now())
        .await
        .unwrap();

        assert_eq!(summary.due, 2);
        assert_eq!(summary.published, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn post_claimed_elsewhere_is_skipped() {
        let cipher = cipher();
        let post = due_post("raced");

        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts
            .expect_find_due()
            .returning(move |_, _| Ok(vec![post.clone()]));
        posts.expect_claim().returning(|_, _| Ok(false));
        posts.expect_mark_published().never();
        posts.expect_mark_failed().never();

        let mut client = platform_client(Platform::YouTube);
        client.expect_publish().never();

        let summary = build(
            posts,
            idle_videos(),
            MockSocialAccountRepository::new(),
            Some(client),
            cipher,
        )
        .run_due_posts(Utc::now())
        .await
        .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.claimed, 0);
    }

    #[tokio::test]
    async fn disconnected_account_fails_the_post() {
        let cipher = cipher();
        let post = due_post("orphan");
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts
            .expect_find_due()
            .returning(move |_, _| Ok(vec![post.clone()]));
        posts.expect_claim().returning(|_, _| Ok(true));
        posts
            .expect_mark_failed()
            .withf(move |id, error| *id == post_id && error == "social account was disconnected")
            .times(1)
            .returning(|_, _| Ok(true));

        let mut accounts = MockSocialAccountRepository::new();
        accounts.expect_find_by_id().returning(|_| Ok(None));

        let summary = build(posts, ready_videos(), accounts, None, cipher)
            .run_due_posts(Utc::now())
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn unconfigured_platform_fails_after_claim() {
        let cipher = cipher();
        let post = due_post("nowhere");

        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts
            .expect_find_due()
            .returning(move |_, _| Ok(vec![post.clone()]));
        posts.expect_claim().returning(|_, _| Ok(true));
        posts
            .expect_mark_failed()
            .withf(|_, error| error.contains("not configured"))
            .times(1)
            .returning(|_, _| Ok(true));

        let summary = build(
            posts,
            ready_videos(),
            accounts_for(&cipher, Platform::Facebook),
            None,
            cipher,
        )
        .run_due_posts(Utc::now())
        .await
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.published, 0);
    }

    #[tokio::test]
    async fn stale_processing_posts_are_failed_first() {
        let now = Utc::now();
        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_fail_stale_processing()
            .withf(move |before, error| {
                *before == now - Duration::minutes(30) && error == STALE_ATTEMPT_ERROR
            })
            .times(1)
            .returning(|_, _| Ok(2));
        posts.expect_find_due().returning(|_, _| Ok(vec![]));

        let summary = build(
            posts,
            idle_videos(),
            MockSocialAccountRepository::new(),
            None,
            cipher(),
        )
        .run_due_posts(now)
        .await
        .unwrap();

        assert_eq!(summary.stale_failed, 2);
        assert_eq!(summary.due, 0);
    }

    #[tokio::test]
    async fn database_outage_fails_the_run() {
        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts
            .expect_find_due()
            .returning(|_, _| Err(anyhow!("connection refused")));

        let err = build(
            posts,
            idle_videos(),
            MockSocialAccountRepository::new(),
            None,
            cipher(),
        )
        .run_due_posts(Utc::now())
        .await
        .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn late_publish_record_is_counted_as_failed() {
        let cipher = cipher();
        let post = due_post("late");
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts
            .expect_find_due()
            .returning(move |_, _| Ok(vec![post.clone()]));
        posts.expect_claim().returning(|_, _| Ok(true));
        posts
            .expect_mark_published()
            .withf(move |id, platform_post_id, _| *id == post_id && platform_post_id == "yt-late")
            .times(1)
            .returning(|_, _, _| Ok(false));
        posts.expect_mark_failed().never();

        let mut client = platform_client(Platform::YouTube);
        client
            .expect_publish()
            .returning(|_, _, _| Ok("yt-late".to_string()));

        let summary = build(
            posts,
            ready_videos(),
            accounts_for(&cipher, Platform::YouTube),
            Some(client),
            cipher,
        )
        .run_due_posts(Utc::now())
        .await
        .unwrap();

        assert_eq!(summary.published, 0);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn stale_processing_videos_are_failed() {
        let now = Utc::now();
        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts.expect_find_due().returning(|_, _| Ok(vec![]));

        let mut videos = MockVideoRepository::new();
        videos
            .expect_fail_stale_processing()
            .withf(move |before, error| {
                *before == now - Duration::hours(2) && error == STALE_VIDEO_ERROR
            })
            .times(1)
            .returning(|_, _| Ok(3));

        let summary = build(
            posts,
            videos,
            MockSocialAccountRepository::new(),
            None,
            cipher(),
        )
        .run_due_posts(now)
        .await
        .unwrap();

        assert_eq!(summary.stale_videos_failed, 3);
        assert_eq!(summary.due, 0);
    }

    #[tokio::test]
    async fn video_sweep_error_does_not_stop_publishing() {
        let mut posts = MockScheduledPostRepository::new();
        no_stale(&mut posts);
        posts.expect_find_due().times(1).returning(|_, _| Ok(vec![]));

        let mut videos = MockVideoRepository::new();
        videos
            .expect_fail_stale_processing()
            .returning(|_, _| Err(anyhow!("connection reset")));

        let summary = build(
            posts,
            videos,
            MockSocialAccountRepository::new(),
            None,
            cipher(),
        )
        .run_due_posts(Utc::now())
        .await
        .unwrap();

        assert_eq!(summary.stale_videos_failed, 0);
    }

    #[test]
    fn long_errors_are_truncated() {
        let long = "e".repeat(MAX_ERROR_CHARS + 10);
        let truncated = truncate(&long, MAX_ERROR_CHARS);
        assert_eq!(truncated.chars().count(), MAX_ERROR_CHARS + 3);
        assert_eq!(truncate("short", MAX_ERROR_CHARS), "short");
    }
}
