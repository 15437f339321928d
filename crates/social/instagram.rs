use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    OAuthAppConfig,
    facebook::{GraphApi, GraphId},
    platform_client::SocialPlatformClient,
};
use crate::domain::value_objects::{
    enums::platforms::Platform,
    scheduled_posts::PublishRequest,
    social_accounts::{ConnectedAccount, OAuthTokens, PlatformIdentity},
};

const INSTAGRAM_SCOPES: &str =
    "instagram_basic,instagram_content_publish,pages_show_list,pages_read_engagement";

/// Bounds for waiting on Instagram to ingest a Reel before it can be published.
#[derive(Debug, Clone, Copy)]
pub struct ContainerPolling {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ContainerPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

pub struct InstagramClient {
    graph: GraphApi,
    polling: ContainerPolling,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    status_code: Option<String>,
    status: Option<String>,
}

impl InstagramClient {
    pub fn new(http: reqwest::Client, app: OAuthAppConfig, polling: ContainerPolling) -> Self {
        Self {
            graph: GraphApi::new(http, app, Platform::Instagram),
            polling,
        }
    }

    async fn wait_until_finished(&self, container_id: &str, access_token: &str) -> Result<()> {
        for attempt in 1..=self.polling.max_attempts {
            let status: ContainerStatus = self
                .graph
                .get(
                    &GraphApi::url(container_id),
                    &[("fields", "status_code,status"), ("access_token", access_token)],
                    "container status",
                )
                .await?;

            match status.status_code.as_deref() {
                Some("FINISHED") | Some("PUBLISHED") => return Ok(()),
                Some("ERROR") | Some("EXPIRED") => bail!(
                    "Instagram could not process the video: {}",
                    status.status.unwrap_or_else(|| "unknown error".to_string())
                ),
                other => {
                    debug!(container_id, attempt, status = ?other, "instagram: container not ready");
                }
            }

            tokio::time::sleep(self.polling.interval).await;
        }

        bail!(
            "Instagram container {} was not ready after {} checks",
            container_id,
            self.polling.max_attempts
        )
    }
}

#[async_trait]
impl SocialPlatformClient for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn authorize_url(&self, state: &str) -> Result<String> {
        self.graph.dialog_url(INSTAGRAM_SCOPES, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<ConnectedAccount> {
        let mut tokens = self.graph.long_lived_user_token(code).await?;
        let pages = self.graph.managed_pages(&tokens.access_token).await?;

        let instagram = pages
            .into_iter()
            .find_map(|page| page.instagram_business_account)
            .ok_or_else(|| {
                anyhow!("no Instagram business account is linked to the user's Facebook pages")
            })?;

        tokens.scopes = Some(INSTAGRAM_SCOPES.to_string());
        Ok(ConnectedAccount {
            identity: PlatformIdentity {
                platform_account_id: instagram.id,
                account_name: instagram.username,
            },
            tokens,
        })
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    async fn refresh_tokens(&self, _refresh_token: &str) -> Result<OAuthTokens> {
        bail!("instagram tokens cannot be refreshed; reconnect required")
    }

    async fn publish(
        &self,
        access_token: &str,
        platform_account_id: &str,
        request: PublishRequest,
    ) -> Result<String> {
        // https://developers.facebook.com/docs/instagram-platform/content-publishing
        let caption = caption(&request.title, request.description.as_deref());

        let container: GraphId = self
            .graph
            .post(
                &GraphApi::url(&format!("{}/media", platform_account_id)),
                &[
                    ("media_type", "REELS"),
                    ("video_url", request.media_url.as_str()),
                    ("caption", caption.as_str()),
                    ("access_token", access_token),
                ],
                "create media container",
            )
            .await?;

        self.wait_until_finished(&container.id, access_token).await?;

        let media: GraphId = self
            .graph
            .post(
                &GraphApi::url(&format!("{}/media_publish", platform_account_id)),
                &[
                    ("creation_id", container.id.as_str()),
                    ("access_token", access_token),
                ],
                "publish media",
            )
            .await?;

        info!(
            ig_user_id = %platform_account_id,
            media_id = %media.id,
            "instagram: reel published"
        );
        Ok(media.id)
    }
}

fn caption(title: &str, description: Option<&str>) -> String {
    match description.map(str::trim).filter(|text| !text.is_empty()) {
        Some(description) => format!("{}\n\n{}", title, description),
        None => title.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_joins_title_and_description() {
        assert_eq!(caption("Hello", Some("world")), "Hello\n\nworld");
        assert_eq!(caption("Hello", Some("  ")), "Hello");
        assert_eq!(caption("Hello", None), "Hello");
    }
}
