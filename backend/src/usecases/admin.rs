use std::sync::Arc;

use axum::http::StatusCode;
use crates::domain::{
    entities::plans::InsertPlanEntity,
    repositories::{
        plans::PlanRepository, scheduled_posts::ScheduledPostRepository,
        subscriptions::SubscriptionRepository, users::UserRepository, videos::VideoRepository,
    },
    value_objects::{
        enums::{billing_intervals::BillingInterval, user_roles::UserRole},
        subscriptions::{AdminPlanDto, CreatePlanRequest},
        users::{DashboardStats, UserDto, UserPage},
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::axum_http::error_responses::impl_error_response;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("user not found")]
    UserNotFound,
    #[error("plan not found")]
    PlanNotFound,
    #[error("admins cannot change their own role")]
    CannotChangeOwnRole,
    #[error("admins cannot delete their own account")]
    CannotDeleteSelf,
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AdminError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdminError::UserNotFound | AdminError::PlanNotFound => StatusCode::NOT_FOUND,
            AdminError::CannotChangeOwnRole
            | AdminError::CannotDeleteSelf
            | AdminError::InvalidPlan(_) => StatusCode::BAD_REQUEST,
            AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl_error_response!(AdminError);

pub type UseCaseResult<T> = std::result::Result<T, AdminError>;

pub struct AdminUseCase<U, S, V, SP, P>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    subscription_repo: Arc<S>,
    video_repo: Arc<V>,
    scheduled_post_repo: Arc<SP>,
    plan_repo: Arc<P>,
}

impl<U, S, V, SP, P> AdminUseCase<U, S, V, SP, P>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    pub fn new(
        user_repo: Arc<U>,
        subscription_repo: Arc<S>,
        video_repo: Arc<V>,
        scheduled_post_repo: Arc<SP>,
        plan_repo: Arc<P>,
    ) -> Self {
        Self {
            user_repo,
            subscription_repo,
            video_repo,
            scheduled_post_repo,
            plan_repo,
        }
    }

    pub async fn list_users(
        &self,
        page: Option<i64>,
        per_page: Option<i64>,
    ) -> UseCaseResult<UserPage> {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);

        let users = self
            .user_repo
            .list((page - 1) * per_page, per_page)
            .await
            .map_err(|err| {
                error!(page, per_page, db_error = ?err, "admin: failed to list users");
                AdminError::Internal(err)
            })?;
        let total = self.user_repo.count().await?;

        Ok(UserPage {
            users: users.into_iter().map(UserDto::from).collect(),
            page,
            per_page,
            total,
        })
    }

    pub async fn update_user_role(
        &self,
        actor_id: Uuid,
        user_id: Uuid,
        role: UserRole,
    ) -> UseCaseResult<UserDto> {
        if actor_id == user_id {
            let err = AdminError::CannotChangeOwnRole;
            warn!(
                %actor_id,
                status = err.status_code().as_u16(),
                "admin: self role change rejected"
            );
            return Err(err);
        }

        if self.user_repo.find_by_id(user_id).await?.is_none() {
            return Err(AdminError::UserNotFound);
        }

        let user = self
            .user_repo
            .update_role(user_id, role)
            .await
            .map_err(|err| {
                error!(%actor_id, %user_id, db_error = ?err, "admin: failed to update role");
                AdminError::Internal(err)
            })?;

        info!(%actor_id, %user_id, role = %role, "admin: user role updated");
        Ok(UserDto::from(user))
    }

    pub async fn delete_user(&self, actor_id: Uuid, user_id: Uuid) -> UseCaseResult<()> {
        if actor_id == user_id {
            return Err(AdminError::CannotDeleteSelf);
        }

        if self.user_repo.find_by_id(user_id).await?.is_none() {
            return Err(AdminError::UserNotFound);
        }

        self.user_repo.delete(user_id).await.map_err(|err| {
            error!(%actor_id, %user_id, db_error = ?err, "admin: failed to delete user");
            AdminError::Internal(err)
        })?;

        info!(%actor_id, %user_id, "admin: user deleted");
        Ok(())
    }

    pub async fn dashboard_stats(&self) -> UseCaseResult<DashboardStats> {
        let (total_users, admin_users, active_subscriptions, total_videos, posts) = tokio::try_join!(
            self.user_repo.count(),
            self.user_repo.count_by_role(UserRole::Admin),
            self.subscription_repo.count_active(),
            self.video_repo.count_all(),
            self.scheduled_post_repo.count_by_status(),
        )
        .map_err(|err| {
            error!(db_error = ?err, "admin: failed to load dashboard stats");
            AdminError::Internal(err)
        })?;

        Ok(DashboardStats {
            total_users,
            admin_users,
            active_subscriptions,
            total_videos,
            posts,
        })
    }

    pub async fn list_plans(&self) -> UseCaseResult<Vec<AdminPlanDto>> {
        let plans = self.plan_repo.list_all_plans().await?;
        Ok(plans.into_iter().map(AdminPlanDto::from).collect())
    }

    pub async fn create_plan(&self, request: CreatePlanRequest) -> UseCaseResult<AdminPlanDto> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AdminError::InvalidPlan("name is required".to_string()));
        }
        if request.price_minor < 0 {
            return Err(AdminError::InvalidPlan("price cannot be negative".to_string()));
        }
        if request.minutes_allowed < 0 {
            return Err(AdminError::InvalidPlan(
                "minutes_allowed cannot be negative".to_string(),
            ));
        }
        let billing_interval = BillingInterval::from_str(&request.billing_interval)
            .ok_or_else(|| {
                AdminError::InvalidPlan("billing_interval must be month or year".to_string())
            })?;

        let features = serde_json::to_value(&request.features)
            .map_err(|err| AdminError::Internal(err.into()))?;

        let plan = self
            .plan_repo
            .create(InsertPlanEntity {
                name,
                description: request.description,
                price_minor: request.price_minor,
                currency: request
                    .currency
                    .map(|currency| currency.trim().to_lowercase())
                    .filter(|currency| !currency.is_empty())
                    .unwrap_or_else(|| "usd".to_string()),
                billing_interval: billing_interval.to_string(),
                stripe_price_id: request.stripe_price_id,
                minutes_allowed: request.minutes_allowed,
                features,
                is_active: true,
            })
            .await
            .map_err(|err| {
                error!(db_error = ?err, "admin: failed to create plan");
                AdminError::Internal(err)
            })?;

        info!(plan_id = %plan.id, "admin: plan created");
        Ok(AdminPlanDto::from(plan))
    }

    pub async fn set_plan_active(
        &self,
        plan_id: Uuid,
        is_active: bool,
    ) -> UseCaseResult<AdminPlanDto> {
        if self.plan_repo.find_by_id(plan_id).await?.is_none() {
            return Err(AdminError::PlanNotFound);
        }

        let plan = self.plan_repo.set_active(plan_id, is_active).await?;
        info!(%plan_id, is_active, "admin: plan availability changed");
        Ok(AdminPlanDto::from(plan))
    }
}
