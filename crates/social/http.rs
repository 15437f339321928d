use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::error;

use crate::domain::value_objects::{
    enums::platforms::Platform, social_accounts::OAuthTokens,
};

/// Logs and fails on a non-2xx provider response. Bodies are truncated; they never contain our tokens.
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
    platform: Platform,
    context: &str,
) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let body = match resp.text().await {
        Ok(text) if !text.is_empty() => text.chars().take(1000).collect::<String>(),
        Ok(_) => "<empty response body>".to_string(),
        Err(err) => format!("<failed to read response body: {err}>"),
    };

    error!(
        %platform,
        status = %status,
        response_body = %body,
        context = %context,
        "social: provider request failed"
    );

    bail!("{} request failed: {} (status {})", platform, context, status);
}

/// The common shape of an OAuth 2.0 token endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_tokens(self, now: DateTime<Utc>) -> OAuthTokens {
        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
            expires_at: expires_at(now, self.expires_in),
            scopes: self.scope.filter(|scope| !scope.is_empty()),
        }
    }
}

pub(crate) fn expires_at(now: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in
        .filter(|seconds| *seconds > 0)
        .map(|seconds| now + Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_maps_expiry_and_drops_empty_values() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "at".into(),
            refresh_token: Some(String::new()),
            expires_in: Some(3600),
            scope: Some("a b".into()),
        };

        let tokens = response.into_tokens(now);

        assert_eq!(tokens.refresh_token, None);
        assert_eq!(tokens.expires_at, Some(now + Duration::seconds(3600)));
        assert_eq!(tokens.scopes.as_deref(), Some("a b"));
        assert_eq!(expires_at(now, Some(0)), None);
    }
}
