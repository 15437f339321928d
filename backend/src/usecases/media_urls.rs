use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::config_model::MediaUrl;

const ISSUER: &str = "clipforge-backend";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaUrlClaims {
    pub sub: String,
    pub uid: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaUrlError {
    #[error("media token is invalid")]
    Invalid,
    #[error("media token has expired")]
    Expired,
    #[error("media token was issued for another video")]
    WrongVideo,
}

/// Signs short-lived URLs that let a platform pull a processed video without a session.
#[derive(Clone)]
pub struct MediaUrlSigner {
    config: MediaUrl,
    public_base_url: String,
}

impl MediaUrlSigner {
    pub fn new(config: MediaUrl, public_base_url: &str) -> Self {
        Self {
            config,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.config.ttl_seconds
    }

    pub fn sign(&self, user_id: Uuid, video_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let exp = now
            .checked_add_signed(Duration::seconds(self.config.ttl_seconds))
            .context("failed to compute media token expiration")?;

        let claims = MediaUrlClaims {
            sub: video_id.to_string(),
            uid: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: ISSUER.to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|err| {
            error!(%user_id, %video_id, error = ?err, "media_url: failed to sign token");
            err
        })
        .context("failed to sign media url token")
    }

    pub fn url(&self, user_id: Uuid, video_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let token = self.sign(user_id, video_id, now)?;
        let url = format!(
            "{}/api/v1/media/{}?token={}",
            self.public_base_url, video_id, token
        );
        debug!(%user_id, %video_id, "media_url: url generated");
        Ok(url)
    }

    pub fn verify(
        &self,
        token: &str,
        video_id: Uuid,
        now: DateTime<Utc>,
    ) -> std::result::Result<MediaUrlClaims, MediaUrlError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against the caller's clock below.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.set_issuer(&[ISSUER]);

        let claims = decode::<MediaUrlClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            warn!(%video_id, error = ?err, "media_url: token rejected");
            MediaUrlError::Invalid
        })?
        .claims;

        if claims.exp <= now.timestamp() {
            return Err(MediaUrlError::Expired);
        }
        if claims.sub != video_id.to_string() {
            warn!(%video_id, token_video = %claims.sub, "media_url: token for another video");
            return Err(MediaUrlError::WrongVideo);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> MediaUrlSigner {
        MediaUrlSigner::new(
            MediaUrl {
                jwt_secret: "media-secret".to_string(),
                ttl_seconds: 600,
            },
            "https://api.example.com/",
        )
    }

    #[test]
    fn signed_url_points_at_media_route() {
        let video_id = Uuid::new_v4();
        let url = signer().url(Uuid::new_v4(), video_id, Utc::now()).unwrap();

        assert!(url.starts_with(&format!(
            "https://api.example.com/api/v1/media/{video_id}?token="
        )));
    }

    #[test]
    fn token_verifies_for_its_video_until_expiry() {
        let signer = signer();
        let user_id = Uuid::new_v4();
        let video_id = Uuid::new_v4();
        let now = Utc::now();
        let token = signer.sign(user_id, video_id, now).unwrap();

        let claims = signer.verify(&token, video_id, now).unwrap();
        assert_eq!(claims.uid, user_id.to_string());

        assert_eq!(
            signer.verify(&token, Uuid::new_v4(), now).unwrap_err(),
            MediaUrlError::WrongVideo
        );
        assert_eq!(
            signer
                .verify(&token, video_id, now + Duration::seconds(601))
                .unwrap_err(),
            MediaUrlError::Expired
        );
    }

    #[test]
    fn token_from_another_secret_is_invalid() {
        let video_id = Uuid::new_v4();
        let other = MediaUrlSigner::new(
            MediaUrl {
                jwt_secret: "other".to_string(),
                ttl_seconds: 600,
            },
            "https://api.example.com",
        );
        let token = other.sign(Uuid::new_v4(), video_id, Utc::now()).unwrap();

        assert_eq!(
            signer().verify(&token, video_id, Utc::now()).unwrap_err(),
            MediaUrlError::Invalid
        );
    }
}
