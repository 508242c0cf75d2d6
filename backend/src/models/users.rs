//! User, role and session records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::define_id_type;

define_id_type!(i64, RoleId);
define_id_type!(i64, UserId);
define_id_type!(i64, SessionId);
define_id_type!(i64, LogId);

/// Role as submitted by the admin UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleWithCount {
    #[serde(flatten)]
    pub role: Role,
    pub user_count: i64,
}

/// Stored user. The password digest never leaves the service layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    pub designation: Option<String>,
    pub role_id: Option<RoleId>,
    pub status: bool,
    pub is_admin: bool,
    pub parameters: Value,
    pub created_at: NaiveDateTime,
    pub failed_attempts: i32,
    pub on_hold_time: Option<NaiveDateTime>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

/// User joined with the name of its role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWithRole {
    #[serde(flatten)]
    pub user: User,
    pub role_name: Option<String>,
}

/// User with role details, latest session and latest status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverview {
    #[serde(flatten)]
    pub user: User,
    pub role_name: Option<String>,
    pub role_description: Option<String>,
    pub role_permissions: Option<Value>,
    pub login_time: Option<NaiveDateTime>,
    pub logout_time: Option<NaiveDateTime>,
    /// Hours between login and logout of the latest session.
    pub active_hours: Option<f64>,
    pub latest_status: Option<NaiveDateTime>,
    pub status_changed_at: Option<NaiveDateTime>,
}

/// Payload for creating a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub role_id: Option<RoleId>,
    #[serde(default)]
    pub status: bool,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Payload for updating a user. The password is only replaced when given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub role_id: Option<RoleId>,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// A user row ready for insertion (password already hashed).
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    pub designation: Option<String>,
    pub role_id: Option<RoleId>,
    pub status: bool,
    pub password_hash: String,
    pub is_admin: bool,
    pub parameters: Value,
    pub created_at: NaiveDateTime,
}

/// A user update ready for persistence.
#[derive(Debug, Clone)]
pub struct UserUpdateRecord {
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    pub designation: Option<String>,
    pub role_id: Option<RoleId>,
    pub status: bool,
    pub password_hash: Option<String>,
    pub parameters: Value,
    pub at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLog {
    pub id: i64,
    pub user_id: UserId,
    pub activated_at: Option<NaiveDateTime>,
    pub inactivated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: SessionId,
    pub user_id: UserId,
    pub login_time: NaiveDateTime,
    pub logout_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub login_time: NaiveDateTime,
    pub user_name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounts {
    pub total_users: i64,
    pub total_roles: i64,
    pub active_users: i64,
    pub inactive_users: i64,
}

/// Application log entry submitted by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppLog {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "type")]
    pub log_type: Option<String>,
}
