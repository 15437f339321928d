use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::info;
use url::Url;

use super::{
    OAuthAppConfig,
    http::{TokenResponse, ensure_success},
    platform_client::SocialPlatformClient,
};
use crate::domain::value_objects::{
    enums::platforms::Platform,
    scheduled_posts::PublishRequest,
    social_accounts::{ConnectedAccount, OAuthTokens, PlatformIdentity},
};

pub const GRAPH_VERSION: &str = "v19.0";
const FACEBOOK_SCOPES: &str =
    "pages_show_list,pages_read_engagement,pages_manage_posts,publish_video";

/// Graph API calls shared by the Facebook and Instagram clients; both log in through Facebook.
pub(crate) struct GraphApi {
    http: reqwest::Client,
    app: OAuthAppConfig,
    platform: Platform,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManagedPage {
    pub id: String,
    pub name: Option<String>,
    pub access_token: Option<String>,
    pub instagram_business_account: Option<InstagramBusinessAccount>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstagramBusinessAccount {
    pub id: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageList {
    #[serde(default)]
    data: Vec<ManagedPage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphId {
    pub id: String,
}

impl GraphApi {
    pub(crate) fn new(http: reqwest::Client, app: OAuthAppConfig, platform: Platform) -> Self {
        Self {
            http,
            app,
            platform,
        }
    }

    pub(crate) fn url(path: &str) -> String {
        format!("https://graph.facebook.com/{}/{}", GRAPH_VERSION, path)
    }

    pub(crate) fn dialog_url(&self, scopes: &str, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &format!("https://www.facebook.com/{}/dialog/oauth", GRAPH_VERSION),
            &[
                ("client_id", self.app.client_id.as_str()),
                ("redirect_uri", self.app.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scopes),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("failed to reach Graph API: {}", context))?;
        let resp = ensure_success(resp, self.platform, context).await?;
        Ok(resp.json().await?)
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        let resp = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("failed to reach Graph API: {}", context))?;
        let resp = ensure_success(resp, self.platform, context).await?;
        Ok(resp.json().await?)
    }

    /// Code → short-lived user token → long-lived (about 60 days) user token.
    pub(crate) async fn long_lived_user_token(&self, code: &str) -> Result<OAuthTokens> {
        let oauth_url = Self::url("oauth/access_token");

        let short: TokenResponse = self
            .get(
                &oauth_url,
                &[
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("redirect_uri", self.app.redirect_uri.as_str()),
                    ("code", code),
                ],
                "exchange code",
            )
            .await?;

        let long: TokenResponse = self
            .get(
                &oauth_url,
                &[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("fb_exchange_token", short.access_token.as_str()),
                ],
                "exchange long-lived token",
            )
            .await?;

        Ok(long.into_tokens(Utc::now()))
    }

    pub(crate) async fn managed_pages(&self, user_token: &str) -> Result<Vec<ManagedPage>> {
        let pages: PageList = self
            .get(
                &Self::url("me/accounts"),
                &[
                    (
                        "fields",
                        "id,name,access_token,instagram_business_account{id,username}",
                    ),
                    ("access_token", user_token),
                ],
                "list pages",
            )
            .await?;
        Ok(pages.data)
    }
}

pub struct FacebookClient {
    graph: GraphApi,
    http: reqwest::Client,
}

impl FacebookClient {
    pub fn new(http: reqwest::Client, app: OAuthAppConfig) -> Self {
        Self {
            graph: GraphApi::new(http.clone(), app, Platform::Facebook),
            http,
        }
    }
}

#[async_trait]
impl SocialPlatformClient for FacebookClient {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn authorize_url(&self, state: &str) -> Result<String> {
        self.graph.dialog_url(FACEBOOK_SCOPES, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<ConnectedAccount> {
        let user_tokens = self.graph.long_lived_user_token(code).await?;
        let pages = self.graph.managed_pages(&user_tokens.access_token).await?;

        let page = pages
            .into_iter()
            .find(|page| page.access_token.is_some())
            .ok_or_else(|| anyhow!("the Facebook account manages no pages"))?;
        let page_token = page
            .access_token
            .ok_or_else(|| anyhow!("Facebook page token is missing"))?;

        // Page tokens derived from a long-lived user token carry no expiry.
        Ok(ConnectedAccount {
            identity: PlatformIdentity {
                platform_account_id: page.id,
                account_name: page.name,
            },
            tokens: OAuthTokens {
                access_token: page_token,
                refresh_token: None,
                expires_at: None,
                scopes: Some(FACEBOOK_SCOPES.to_string()),
            },
        })
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    async fn refresh_tokens(&self, _refresh_token: &str) -> Result<OAuthTokens> {
        bail!("facebook page tokens cannot be refreshed; reconnect required")
    }

    async fn publish(
        &self,
        access_token: &str,
        platform_account_id: &str,
        request: PublishRequest,
    ) -> Result<String> {
        // https://developers.facebook.com/docs/video-api/guides/publishing
        let url = format!(
            "https://graph-video.facebook.com/{}/{}/videos",
            GRAPH_VERSION, platform_account_id
        );
        let description = request.description.clone().unwrap_or_default();

        let resp = self
            .http
            .post(&url)
            .form(&[
                ("file_url", request.media_url.as_str()),
                ("title", request.title.as_str()),
                ("description", description.as_str()),
                ("access_token", access_token),
            ])
            .send()
            .await
            .context("failed to reach Graph API: publish page video")?;
        let resp = ensure_success(resp, Platform::Facebook, "publish page video").await?;

        let video: GraphId = resp.json().await?;
        info!(
            page_id = %platform_account_id,
            video_id = %video.id,
            "facebook: page video published"
        );
        Ok(video.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialog_url_targets_versioned_facebook_login() {
        let client = FacebookClient::new(
            reqwest::Client::new(),
            OAuthAppConfig {
                client_id: "app-1".into(),
                client_secret: "secret".into(),
                redirect_uri: "https://app.example.com/cb".into(),
            },
        );

        let url = Url::parse(&client.authorize_url("s1").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), format!("/{}/dialog/oauth", GRAPH_VERSION));
        assert!(params["scope"].contains("pages_manage_posts"));
        assert_eq!(params["state"], "s1");
    }

    #[test]
    fn managed_pages_parse_linked_instagram_accounts() {
        let pages: PageList = serde_json::from_value(serde_json::json!({
            "data": [
                {"id": "p1", "name": "Shop", "access_token": "pt"},
                {"id": "p2", "access_token": "pt2",
                 "instagram_business_account": {"id": "ig1", "username": "shop.ig"}}
            ]
        }))
        .unwrap();

        assert!(pages.data[0].instagram_business_account.is_none());
        assert_eq!(
            pages.data[1].instagram_business_account.as_ref().map(|ig| ig.id.as_str()),
            Some("ig1")
        );
    }
}
