use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use backend::usecases::publish_scheduled_posts::PublishScheduledPostsUseCase;
use chrono::{DateTime, Utc};
use crates::domain::{
    repositories::{
        scheduled_posts::ScheduledPostRepository, social_accounts::SocialAccountRepository,
        videos::VideoRepository,
    },
    value_objects::scheduled_posts::PublishSummary,
};
use mockall::automock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// One publish pass over the posts that are due.
#[automock]
#[async_trait]
pub trait DuePostPublisher: Send + Sync {
    async fn run_due_posts(&self, now: DateTime<Utc>) -> Result<PublishSummary>;
}

#[async_trait]
impl<SP, V, A> DuePostPublisher for PublishScheduledPostsUseCase<SP, V, A>
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    async fn run_due_posts(&self, now: DateTime<Utc>) -> Result<PublishSummary> {
        Ok(PublishScheduledPostsUseCase::run_due_posts(self, now).await?)
    }
}

/// Runs a publish pass every `interval` until `shutdown` resolves. A failed pass is logged and
/// retried on the next tick; a pass in flight is allowed to finish before the loop exits.
pub async fn run_publish_loop<P, F>(publisher: Arc<P>, interval: Duration, shutdown: F)
where
    P: DuePostPublisher + ?Sized,
    F: Future<Output = ()>,
{
    info!(interval_secs = interval.as_secs(), "publish_loop: started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("publish_loop: shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                run_once(publisher.as_ref()).await;
            }
        }
    }

    info!("publish_loop: stopped");
}

async fn run_once<P>(publisher: &P)
where
    P: DuePostPublisher + ?Sized,
{
    match publisher.run_due_posts(Utc::now()).await {
        Ok(summary)
            if summary.due == 0 && summary.stale_failed == 0 && summary.stale_videos_failed == 0 =>
         {
            debug!("publish_loop: nothing due");
        }
        Ok(summary) => {
            info!(
                due = summary.due,
                published = summary.published,
                failed = summary.failed,
                skipped = summary.skipped,
                stale_failed = summary.stale_failed,
                stale_videos_failed = summary.stale_videos_failed,
                "publish_loop: pass finished"
            );
        }
        Err(err) => {
            error!(error = ?err, "publish_loop: pass failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn runs_a_pass_per_tick_until_shutdown() {
        let mut publisher = MockDuePostPublisher::new();
        publisher
            .expect_run_due_posts()
            .times(3)
            .returning(|_| Ok(PublishSummary::default()));

        let shutdown = tokio::time::sleep(Duration::from_secs(25));
        run_publish_loop(Arc::new(publisher), Duration::from_secs(10), shutdown).await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_does_not_stop_the_loop() {
        let mut publisher = MockDuePostPublisher::new();
        let mut seq = mockall::Sequence::new();
        publisher
            .expect_run_due_posts()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("database unavailable")));
        publisher
            .expect_run_due_posts()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(PublishSummary {
                    due: 2,
                    claimed: 2,
                    published: 2,
                    ..PublishSummary::default()
                })
            });

        let shutdown = tokio::time::sleep(Duration::from_secs(15));
        run_publish_loop(Arc::new(publisher), Duration::from_secs(10), shutdown).await;
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_shutdown_may_skip_all_passes() {
        let mut publisher = MockDuePostPublisher::new();
        publisher.expect_run_due_posts().times(0..=1).returning(|_| Ok(PublishSummary::default()));

        run_publish_loop(Arc::new(publisher), Duration::from_secs(10), async {}).await;
    }
}
