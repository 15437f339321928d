use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use crates::domain::{
    entities::users::InsertUserEntity,
    repositories::{
        plans::PlanRepository, subscriptions::SubscriptionRepository, users::UserRepository,
    },
    value_objects::{
        enums::user_roles::UserRole,
        subscriptions::CurrentSubscriptionDto,
        users::{AuthResponse, LoginRequest, RegisterRequest, UserDto},
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        SessionKeys,
        password::{hash_password, verify_password},
    },
    axum_http::error_responses::impl_error_response,
    usecases::subscriptions::current_subscription_dto,
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    #[error("email is already registered")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidEmail | AuthError::WeakPassword => StatusCode::BAD_REQUEST,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl_error_response!(AuthError);

pub type UseCaseResult<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserDto,
    pub subscription: Option<CurrentSubscriptionDto>,
}

pub struct AuthUseCase<U, S, P>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    subscription_repo: Arc<S>,
    plan_repo: Arc<P>,
    session_keys: Arc<SessionKeys>,
}

impl<U, S, P> AuthUseCase<U, S, P>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    pub fn new(
        user_repo: Arc<U>,
        subscription_repo: Arc<S>,
        plan_repo: Arc<P>,
        session_keys: Arc<SessionKeys>,
    ) -> Self {
        Self {
            user_repo,
            subscription_repo,
            plan_repo,
            session_keys,
        }
    }

    pub fn session_keys(&self) -> &SessionKeys {
        &self.session_keys
    }

    pub async fn register(&self, request: RegisterRequest) -> UseCaseResult<AuthResponse> {
        let email = normalize_email(&request.email);
        if !is_valid_email(&email) {
            warn!("auth: register rejected, invalid email");
            return Err(AuthError::InvalidEmail);
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            warn!("auth: register rejected, weak password");
            return Err(AuthError::WeakPassword);
        }

        let existing = self.user_repo.find_by_email(&email).await.map_err(|err| {
            error!(db_error = ?err, "auth: failed to check email availability");
            AuthError::Internal(err)
        })?;
        if existing.is_some() {
            warn!("auth: register rejected, email taken");
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(&request.password)?;
        let name = request
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        let user = self
            .user_repo
            .create(InsertUserEntity {
                email,
                password_hash,
                name,
                role: UserRole::User.to_string(),
            })
            .await
            .map_err(|err| {
                error!(db_error = ?err, "auth: failed to create user");
                AuthError::Internal(err)
            })?;

        info!(user_id = %user.id, "auth: user registered");

        let token = self.session_keys.issue(&user, Utc::now())?;
        Ok(AuthResponse {
            token,
            user: UserDto::from(user),
        })
    }

    pub async fn login(&self, request: LoginRequest) -> UseCaseResult<AuthResponse> {
        let email = normalize_email(&request.email);

        let user = self
            .user_repo
            .find_by_email(&email)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "auth: failed to load user for login");
                AuthError::Internal(err)
            })?
            .ok_or_else(|| {
                warn!("auth: login rejected, unknown email");
                AuthError::InvalidCredentials
            })?;

        if !verify_password(&request.password, &user.password_hash)? {
            warn!(user_id = %user.id, "auth: login rejected, wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "auth: user logged in");

        let token = self.session_keys.issue(&user, Utc::now())?;
        Ok(AuthResponse {
            token,
            user: UserDto::from(user),
        })
    }

    pub async fn me(&self, user_id: Uuid) -> UseCaseResult<MeResponse> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "auth: failed to load current user");
                AuthError::Internal(err)
            })?
            .ok_or(AuthError::UserNotFound)?;

        let subscription = match self.subscription_repo.find_by_user_id(user_id).await? {
            Some(subscription) => {
                let plan = self.plan_repo.find_by_id(subscription.plan_id).await?;
                plan.map(|plan| current_subscription_dto(subscription, plan))
            }
            None => None,
        };

        Ok(MeResponse {
            user: UserDto::from(user),
            subscription,
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check only: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crates::domain::{
        entities::users::UserEntity,
        repositories::{
            plans::MockPlanRepository, subscriptions::MockSubscriptionRepository,
            users::MockUserRepository,
        },
    };

    fn keys() -> Arc<SessionKeys> {
        Arc::new(SessionKeys::new("auth-usecase-secret", 1, false))
    }

    fn stored_user(email: &str, password: &str) -> UserEntity {
        let now = Utc::now();
        UserEntity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: hash_password(password).unwrap(),
            name: None,
            role: "user".to_string(),
            stripe_customer_id: None,
            is_subscribed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn usecase(
        users: MockUserRepository,
    ) -> AuthUseCase<MockUserRepository, MockSubscriptionRepository, MockPlanRepository> {
        AuthUseCase::new(
            Arc::new(users),
            Arc::new(MockSubscriptionRepository::new()),
            Arc::new(MockPlanRepository::new()),
            keys(),
        )
    }

    #[tokio::test]
    async fn register_creates_a_user_with_a_hashed_password() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .withf(|email| email == "new@example.com")
            .returning(|_| Ok(None));
        users
            .expect_create()
            .withf(|insert| {
                insert.email == "new@example.com"
                    && insert.role == "user"
                    && insert.password_hash.starts_with("$argon2")
            })
            .returning(|insert| {
                let now = Utc::now();
                Ok(UserEntity {
                    id: Uuid::new_v4(),
                    email: insert.email,
                    password_hash: insert.password_hash,
                    name: insert.name,
                    role: insert.role,
                    stripe_customer_id: None,
                    is_subscribed: false,
                    created_at: now,
                    updated_at: now,
                })
            });

        let response = usecase(users)
            .register(RegisterRequest {
                email: "  New@Example.com ".to_string(),
                password: "long enough".to_string(),
                name: Some("  ".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(response.user.email, "new@example.com");
        assert_eq!(response.user.name, None);
        assert!(keys().validate(&response.token).is_ok());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_with_conflict() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .returning(|email| Ok(Some(stored_user(email, "whatever1"))));
        users.expect_create().never();

        let err = usecase(users)
            .register(RegisterRequest {
                email: "taken@example.com".to_string(),
                password: "long enough".to_string(),
                name: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::EmailTaken));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn register_validates_input_before_touching_the_database() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().never();

        let usecase = usecase(users);
        let weak = usecase
            .register(RegisterRequest {
                email: "a@example.com".to_string(),
                password: "short".to_string(),
                name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(weak, AuthError::WeakPassword));

        let invalid = usecase
            .register(RegisterRequest {
                email: "not-an-email".to_string(),
                password: "long enough".to_string(),
                name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(invalid, AuthError::InvalidEmail));
    }

    #[tokio::test]
    async fn login_checks_the_password() {
        let stored = stored_user("me@example.com", "correct password");
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .returning(move |_| Ok(Some(stored.clone())));

        let usecase = usecase(users);

        let ok = usecase
            .login(LoginRequest {
                email: "ME@example.com".to_string(),
                password: "correct password".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(ok.user.email, "me@example.com");

        let err = usecase
            .login(LoginRequest {
                email: "me@example.com".to_string(),
                password: "wrong password".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_with_unknown_email_is_unauthorized() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| Ok(None));

        let err = usecase(users)
            .login(LoginRequest {
                email: "ghost@example.com".to_string(),
                password: "whatever123".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a b@c.co"));
        assert!(!is_valid_email("a@@b.co"));
    }
}
