use super::*;
use axum::{
    Extension, Router,
    body::Body,
    http::{Request, header::COOKIE},
    routing::get,
};
use chrono::Utc;
use tower::ServiceExt;

const SECRET: &str = "supersecretjwtsecretforunittesting123";

fn keys() -> SessionKeys {
    SessionKeys::new(SECRET, 24, false)
}

fn user(role: UserRole) -> UserEntity {
    let now = Utc::now();
    UserEntity {
        id: Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap(),
        email: "test@example.com".to_string(),
        password_hash: "unused".to_string(),
        name: None,
        role: role.to_string(),
        stripe_customer_id: None,
        is_subscribed: false,
        created_at: now,
        updated_at: now,
    }
}

fn app() -> Router {
    Router::new()
        .route(
            "/me",
            get(|auth: AuthUser| async move { auth.user_id.to_string() }),
        )
        .route(
            "/admin",
            get(|AdminUser(auth): AdminUser| async move { auth.email }),
        )
        .layer(Extension(Arc::new(keys())))
}

async fn status_for(request: Request<Body>) -> StatusCode {
    app().oneshot(request).await.unwrap().status()
}

#[test]
fn test_issue_and_validate_session_token() {
    let token = keys().issue(&user(UserRole::User), Utc::now()).unwrap();

    let claims = keys().validate(&token).expect("Valid token should pass");
    assert_eq!(claims.sub, "123e4567-e89b-12d3-a456-426614174000");
    assert_eq!(claims.role, "user");
    assert_eq!(claims.email, "test@example.com");
}

#[test]
fn test_validate_session_token_expired() {
    let issued_long_ago = Utc::now() - Duration::hours(48);
    let token = keys().issue(&user(UserRole::User), issued_long_ago).unwrap();

    assert!(keys().validate(&token).is_err());
}

#[test]
fn test_validate_session_token_invalid_signature() {
    let other = SessionKeys::new("wrongsecret", 24, false);
    let token = other.issue(&user(UserRole::User), Utc::now()).unwrap();

    assert!(keys().validate(&token).is_err());
}

#[test]
fn test_password_hash_round_trip() {
    let hash = password::hash_password("correct horse battery").unwrap();

    assert_ne!(hash, "correct horse battery");
    assert!(password::verify_password("correct horse battery", &hash).unwrap());
    assert!(!password::verify_password("wrong horse", &hash).unwrap());
    assert!(password::verify_password("x", "not-a-phc-string").is_err());
}

#[test]
fn test_session_cookie_flags() {
    let cookie = SessionKeys::new(SECRET, 1, true).session_cookie("abc".to_string());

    assert_eq!(cookie.name(), SESSION_COOKIE);
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.max_age(), Some(cookie::time::Duration::hours(1)));
}

#[tokio::test]
async fn test_missing_session_is_unauthorized() {
    let request = Request::get("/me").body(Body::empty()).unwrap();
    assert_eq!(status_for(request).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_bearer_is_unauthorized() {
    let request = Request::get("/me")
        .header(AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    assert_eq!(status_for(request).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_and_cookie_sessions_are_accepted() {
    let token = keys().issue(&user(UserRole::User), Utc::now()).unwrap();

    let bearer = Request::get("/me")
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    assert_eq!(status_for(bearer).await, StatusCode::OK);

    let cookie = Request::get("/me")
        .header(COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .body(Body::empty())
        .unwrap();
    assert_eq!(status_for(cookie).await, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_route_requires_admin_role() {
    let user_token = keys().issue(&user(UserRole::User), Utc::now()).unwrap();
    let admin_token = keys().issue(&user(UserRole::Admin), Utc::now()).unwrap();

    let anonymous = Request::get("/admin").body(Body::empty()).unwrap();
    assert_eq!(status_for(anonymous).await, StatusCode::UNAUTHORIZED);

    let as_user = Request::get("/admin")
        .header(AUTHORIZATION, format!("Bearer {}", user_token))
        .body(Body::empty())
        .unwrap();
    assert_eq!(status_for(as_user).await, StatusCode::FORBIDDEN);

    let as_admin = Request::get("/admin")
        .header(AUTHORIZATION, format!("Bearer {}", admin_token))
        .body(Body::empty())
        .unwrap();
    assert_eq!(status_for(as_admin).await, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_session_keys_is_a_server_error() {
    let app = Router::new().route(
        "/me",
        get(|auth: AuthUser| async move { auth.user_id.to_string() }),
    );
    let token = keys().issue(&user(UserRole::User), Utc::now()).unwrap();

    let response = app
        .oneshot(
            Request::get("/me")
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
