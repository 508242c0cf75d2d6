use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Jsonb, Nullable, Text, Timestamp};
use serde_json::Value;

use super::schema::{sm_logs, sm_roles, sm_session_logs, sm_status_logs, sm_users};
use crate::models::{Role, RoleId, SessionId, SessionLog, StatusLog, User, UserId};

// ==================== Observation rows (raw SQL) ====================

/// A whole observation row as produced by `to_jsonb(t)`.
#[derive(Debug, QueryableByName)]
pub struct JsonRow {
    #[diesel(sql_type = Jsonb)]
    pub data: Value,
}

#[derive(Debug, QueryableByName)]
pub struct LastTimestampRow {
    #[diesel(sql_type = Nullable<Timestamp>)]
    pub last: Option<NaiveDateTime>,
}

#[derive(Debug, QueryableByName)]
pub struct MergedRow {
    #[diesel(sql_type = Timestamp)]
    pub timestamp: NaiveDateTime,
    #[diesel(sql_type = Nullable<Text>)]
    pub station_id: Option<String>,
    #[diesel(sql_type = Jsonb)]
    pub values: Value,
}

#[derive(Debug, QueryableByName)]
pub struct AverageRow {
    #[diesel(sql_type = Timestamp)]
    pub period: NaiveDateTime,
    #[diesel(sql_type = Nullable<Text>)]
    pub station_id: Option<String>,
    #[diesel(sql_type = Jsonb)]
    pub averages: Value,
}

#[derive(Debug, QueryableByName)]
pub struct PresenceRow {
    #[diesel(sql_type = BigInt)]
    pub idx: i64,
    #[diesel(sql_type = BigInt)]
    pub total_records: i64,
    #[diesel(sql_type = Jsonb)]
    pub present: Value,
}

// ==================== User administration ====================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sm_roles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RoleRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Value,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: RoleId::new(row.id),
            name: row.name,
            description: row.description,
            permissions: row.permissions,
        }
    }
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = sm_roles)]
#[diesel(treat_none_as_null = true)]
pub struct RoleChangeset {
    pub name: String,
    pub description: Option<String>,
    pub permissions: Value,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sm_users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    pub designation: Option<String>,
    pub role_id: Option<i64>,
    pub status: bool,
    pub password: String,
    pub is_admin: bool,
    pub parameters: Value,
    pub created_at: NaiveDateTime,
    pub failed_attempts: i32,
    pub on_hold_time: Option<NaiveDateTime>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::new(row.id),
            full_name: row.full_name,
            user_name: row.user_name,
            email: row.email,
            designation: row.designation,
            role_id: row.role_id.map(RoleId::new),
            status: row.status,
            is_admin: row.is_admin,
            parameters: row.parameters,
            created_at: row.created_at,
            failed_attempts: row.failed_attempts,
            on_hold_time: row.on_hold_time,
            password_hash: row.password,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sm_users)]
pub struct NewUserRow {
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    pub designation: Option<String>,
    pub role_id: Option<i64>,
    pub status: bool,
    pub password: String,
    pub is_admin: bool,
    pub parameters: Value,
    pub created_at: NaiveDateTime,
}

/// Profile update; `password` is left untouched when `None`.
///
/// The nullable columns are always `Some(..)` so that an empty value clears them.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = sm_users)]
pub struct UserChangeset {
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    pub designation: Option<Option<String>>,
    pub role_id: Option<Option<i64>>,
    pub status: bool,
    pub password: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sm_session_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionRow {
    pub id: i64,
    pub user_id: i64,
    pub login_time: NaiveDateTime,
    pub logout_time: Option<NaiveDateTime>,
}

impl From<SessionRow> for SessionLog {
    fn from(row: SessionRow) -> Self {
        SessionLog {
            id: SessionId::new(row.id),
            user_id: UserId::new(row.user_id),
            login_time: row.login_time,
            logout_time: row.logout_time,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sm_status_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StatusLogRow {
    pub id: i64,
    pub user_id: i64,
    pub activated_at: Option<NaiveDateTime>,
    pub inactivated_at: Option<NaiveDateTime>,
}

impl From<StatusLogRow> for StatusLog {
    fn from(row: StatusLogRow) -> Self {
        StatusLog {
            id: row.id,
            user_id: UserId::new(row.user_id),
            activated_at: row.activated_at,
            inactivated_at: row.inactivated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sm_logs)]
pub struct NewLogRow {
    pub message: String,
    pub location: Option<String>,
    pub log_type: Option<String>,
    pub log_time: NaiveDateTime,
}
