use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::users::UserEntity, value_objects::enums::user_roles::UserRole,
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserDto {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub is_subscribed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserEntity> for UserDto {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id,
            email: value.email,
            name: value.name,
            role: UserRole::from_str(&value.role).unwrap_or_default(),
            is_subscribed: value.is_subscribed,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserDto,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<UserDto>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, Default, PartialEq)]
pub struct PostStatusCounts {
    pub scheduled: i64,
    pub processing: i64,
    pub published: i64,
    pub failed: i64,
}

#[derive(Debug, Serialize, Default, PartialEq)]
pub struct DashboardStats {
    pub total_users: i64,
    pub admin_users: i64,
    pub active_subscriptions: i64,
    pub total_videos: i64,
    pub posts: PostStatusCounts,
}
