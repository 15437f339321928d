pub mod password;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use crates::domain::{entities::users::UserEntity, value_objects::enums::user_roles::UserRole};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::axum_http::error_responses::error_response;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: String,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

/// Signing material for session tokens, shared with extractors through a request extension.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure_cookie: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64, secure_cookie: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
            secure_cookie,
        }
    }

    pub fn issue(&self, user: &UserEntity, now: DateTime<Utc>) -> anyhow::Result<String> {
        let claims = SessionClaims {
            sub: user.id.to_string(),
            role: user.role.clone(),
            email: user.email.clone(),
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn validate(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|err| anyhow::anyhow!("session validation failed: {}", err))?;
        Ok(token_data.claims)
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(cookie::time::Duration::seconds(self.ttl.num_seconds()))
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(cookie::time::Duration::ZERO)
            .build()
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

/// An `AuthUser` whose session carries the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let keys = parts
            .extensions
            .get::<Arc<SessionKeys>>()
            .cloned()
            .ok_or_else(|| {
                error!("auth: session keys extension is not installed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "")
            })?;

        // Bearer wins over the cookie so API clients are unaffected by a stale browser session.
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_token(&parts.headers))
            .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Authentication required"))?;

        let claims = keys.validate(&token).map_err(|err| {
            warn!(error = ?err, "auth: rejected session token");
            error_response(StatusCode::UNAUTHORIZED, "Invalid or expired session")
        })?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
            error_response(StatusCode::UNAUTHORIZED, "Invalid user ID in token")
        })?;
        let role = UserRole::from_str(&claims.role).ok_or_else(|| {
            error_response(StatusCode::UNAUTHORIZED, "Invalid role in token")
        })?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
            role,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        if user.role != UserRole::Admin {
            warn!(user_id = %user.user_id, "auth: non-admin attempted admin route");
            return Err(error_response(StatusCode::FORBIDDEN, "Admin access required"));
        }

        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests;
