use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::social_accounts::SocialAccountEntity, value_objects::enums::platforms::Platform,
};

/// Public view of a connected account. Never carries tokens.
#[derive(Debug, Clone, Serialize)]
pub struct SocialAccountDto {
    pub id: Uuid,
    pub platform: String,
    pub platform_account_id: String,
    pub account_name: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub connected_at: DateTime<Utc>,
}

impl From<SocialAccountEntity> for SocialAccountDto {
    fn from(value: SocialAccountEntity) -> Self {
        Self {
            id: value.id,
            platform: value.platform,
            platform_account_id: value.platform_account_id,
            account_name: value.account_name,
            token_expires_at: value.token_expires_at,
            connected_at: value.created_at,
        }
    }
}

/// Plaintext token set as returned by a provider. Lives only in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
}

/// The account a token set belongs to on the platform side.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformIdentity {
    pub platform_account_id: String,
    pub account_name: Option<String>,
}

/// Everything a callback produces: who the account is and the tokens to store for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedAccount {
    pub identity: PlatformIdentity,
    pub tokens: OAuthTokens,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub platform: Platform,
    pub authorize_url: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}
