use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::value_objects::enums::platforms::Platform;

type HmacSha256 = Hmac<Sha256>;

pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthStatePayload {
    pub user_id: Uuid,
    pub platform: Platform,
    pub nonce: String,
    /// Unix seconds.
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OAuthStateError {
    #[error("state parameter is malformed")]
    Malformed,
    #[error("state signature does not match")]
    BadSignature,
    #[error("state has expired")]
    Expired,
    #[error("state was issued for a different platform")]
    PlatformMismatch,
}

/// Issues and checks the OAuth `state` parameter: `base64url(json) "." hex(hmac_sha256(json_b64))`.
///
/// Nothing is stored server side; the signature and expiry carry the CSRF guarantee.
#[derive(Clone)]
pub struct OAuthStateSigner {
    mac: HmacSha256,
    ttl: Duration,
}

impl OAuthStateSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|_| anyhow::anyhow!("invalid OAuth state secret"))?;

        Ok(Self {
            mac,
            ttl: Duration::minutes(STATE_TTL_MINUTES),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(
        &self,
        user_id: Uuid,
        platform: Platform,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let payload = OAuthStatePayload {
            user_id,
            platform,
            nonce: hex::encode(nonce),
            exp: (now + self.ttl).timestamp(),
        };

        let json = serde_json::to_vec(&payload)?;
        let encoded = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac.clone();
        mac.update(encoded.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", encoded, signature))
    }

    pub fn verify(
        &self,
        state: &str,
        expected_platform: Platform,
        now: DateTime<Utc>,
    ) -> Result<OAuthStatePayload, OAuthStateError> {
        let (encoded, signature) = state.split_once('.').ok_or(OAuthStateError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| OAuthStateError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| OAuthStateError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| OAuthStateError::Malformed)?;
        let payload: OAuthStatePayload =
            serde_json::from_slice(&json).map_err(|_| OAuthStateError::Malformed)?;

        if payload.exp < now.timestamp() {
            return Err(OAuthStateError::Expired);
        }
        if payload.platform != expected_platform {
            return Err(OAuthStateError::PlatformMismatch);
        }

        Ok(payload)
    }
}
