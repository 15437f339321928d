use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use super::{
    OAuthAppConfig,
    http::{ensure_success, expires_at},
    platform_client::SocialPlatformClient,
};
use crate::domain::value_objects::{
    enums::platforms::Platform,
    scheduled_posts::PublishRequest,
    social_accounts::{ConnectedAccount, OAuthTokens, PlatformIdentity},
};

const AUTHORIZE_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";
const TOKEN_URL: &str = "https://open.tiktokapis.com/v2/oauth/token/";
const USER_INFO_URL: &str = "https://open.tiktokapis.com/v2/user/info/";
const PUBLISH_INIT_URL: &str = "https://open.tiktokapis.com/v2/post/publish/video/init/";
const SCOPES: &str = "user.info.basic,video.publish,video.upload";

pub struct TikTokClient {
    http: reqwest::Client,
    app: OAuthAppConfig,
    /// Unaudited apps may only post as `SELF_ONLY`.
    privacy_level: String,
}

/// TikTok reports token errors in a 200 body.
#[derive(Debug, Deserialize)]
struct TikTokTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    open_id: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct UserInfoData {
    user: TikTokUser,
}

#[derive(Debug, Deserialize)]
struct TikTokUser {
    open_id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublishInitData {
    publish_id: String,
}

impl<T> Envelope<T> {
    fn into_data(self, context: &str) -> Result<T> {
        if let Some(error) = self.error.as_ref().filter(|error| error.code != "ok") {
            bail!("TikTok {} failed: {} {}", context, error.code, error.message);
        }
        self.data
            .ok_or_else(|| anyhow!("TikTok {} returned no data", context))
    }
}

impl TikTokClient {
    pub fn new(http: reqwest::Client, app: OAuthAppConfig, privacy_level: String) -> Self {
        Self {
            http,
            app,
            privacy_level,
        }
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        context: &str,
    ) -> Result<(OAuthTokens, Option<String>)> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(form)
            .send()
            .await
            .with_context(|| format!("failed to reach TikTok: {}", context))?;
        let resp = ensure_success(resp, Platform::TikTok, context).await?;

        let token: TikTokTokenResponse = resp.json().await?;
        if let Some(error) = token.error.filter(|error| !error.is_empty()) {
            bail!(
                "TikTok {} failed: {} {}",
                context,
                error,
                token.error_description.unwrap_or_default()
            );
        }

        let access_token = token
            .access_token
            .ok_or_else(|| anyhow!("TikTok {} returned no access token", context))?;

        Ok((
            OAuthTokens {
                access_token,
                refresh_token: token.refresh_token.filter(|value| !value.is_empty()),
                expires_at: expires_at(Utc::now(), token.expires_in),
                scopes: token.scope,
            },
            token.open_id,
        ))
    }

    async fn display_name(&self, access_token: &str) -> Result<TikTokUser> {
        let resp = self
            .http
            .get(USER_INFO_URL)
            .query(&[("fields", "open_id,display_name")])
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .context("failed to reach TikTok: user info")?;
        let resp = ensure_success(resp, Platform::TikTok, "user info").await?;

        let envelope: Envelope<UserInfoData> = resp.json().await?;
        Ok(envelope.into_data("user info")?.user)
    }
}

#[async_trait]
impl SocialPlatformClient for TikTokClient {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_key", self.app.client_id.as_str()),
                ("scope", SCOPES),
                ("response_type", "code"),
                ("redirect_uri", self.app.redirect_uri.as_str()),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<ConnectedAccount> {
        let (tokens, open_id) = self
            .token_request(
                &[
                    ("client_key", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("code", code),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", self.app.redirect_uri.as_str()),
                ],
                "exchange code",
            )
            .await?;

        // The profile lookup is cosmetic; the open_id from the token response is authoritative.
        let user = match self.display_name(&tokens.access_token).await {
            Ok(user) => Some(user),
            Err(err) => {
                warn!("tiktok: failed to load profile after connect: {err:?}");
                None
            }
        };

        let platform_account_id = open_id
            .or_else(|| user.as_ref().and_then(|user| user.open_id.clone()))
            .ok_or_else(|| anyhow!("TikTok did not return an open_id"))?;

        Ok(ConnectedAccount {
            identity: PlatformIdentity {
                platform_account_id,
                account_name: user.and_then(|user| user.display_name),
            },
            tokens,
        })
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let (mut tokens, _) = self
            .token_request(
                &[
                    ("client_key", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
                "refresh token",
            )
            .await?;

        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        Ok(tokens)
    }

    async fn publish(
        &self,
        access_token: &str,
        platform_account_id: &str,
        request: PublishRequest,
    ) -> Result<String> {
        // https://developers.tiktok.com/doc/content-posting-api-reference-direct-post
        let body = json!({
            "post_info": {
                "title": request.title,
                "privacy_level": self.privacy_level,
                "disable_comment": false,
                "disable_duet": false,
                "disable_stitch": false,
            },
            "source_info": {
                "source": "PULL_FROM_URL",
                "video_url": request.media_url,
            }
        });

        let resp = self
            .http
            .post(PUBLISH_INIT_URL)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&body)
            .send()
            .await
            .context("failed to reach TikTok: publish init")?;
        let resp = ensure_success(resp, Platform::TikTok, "publish init").await?;

        let envelope: Envelope<PublishInitData> = resp.json().await?;
        let publish_id = envelope.into_data("publish init")?.publish_id;

        info!(
            open_id = %platform_account_id,
            publish_id = %publish_id,
            "tiktok: publish accepted"
        );
        Ok(publish_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_surfaces_api_errors() {
        let failed: Envelope<PublishInitData> = serde_json::from_value(json!({
            "error": {"code": "spam_risk_too_many_posts", "message": "slow down"}
        }))
        .unwrap();
        let err = failed.into_data("publish init").unwrap_err();
        assert!(err.to_string().contains("spam_risk_too_many_posts"));

        let ok: Envelope<PublishInitData> = serde_json::from_value(json!({
            "data": {"publish_id": "v_pub_1"},
            "error": {"code": "ok", "message": ""}
        }))
        .unwrap();
        assert_eq!(ok.into_data("publish init").unwrap().publish_id, "v_pub_1");
    }

    #[test]
    fn authorize_url_uses_client_key() {
        let client = TikTokClient::new(
            reqwest::Client::new(),
            OAuthAppConfig {
                client_id: "awkey".into(),
                client_secret: "secret".into(),
                redirect_uri: "https://app.example.com/cb".into(),
            },
            "SELF_ONLY".into(),
        );

        let url = Url::parse(&client.authorize_url("abc").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["client_key"], "awkey");
        assert_eq!(params["scope"], SCOPES);
    }
}
