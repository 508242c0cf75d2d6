//! Roles, users, sessions and the application log table.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::error::RepositoryResult;
use crate::models::{
    ActiveSession, LogId, NewAppLog, NewUserRecord, Role, RoleId, RoleInput, RoleWithCount,
    SessionId, StatusLog, User, UserCounts, UserId, UserOverview, UserUpdateRecord, UserWithRole,
};

/// Repository trait for the user administration tables.
///
/// Methods writing more than one table (`create_user`, `update_user`,
/// `set_user_status`) are atomic: either every statement applies or none.
#[async_trait]
pub trait UserRepository: Send + Sync {
    // ==================== Roles ====================

    async fn create_role(&self, role: &RoleInput) -> RepositoryResult<Role>;

    /// Roles ascending by id, with the number of users holding each.
    async fn list_roles_with_counts(&self) -> RepositoryResult<Vec<RoleWithCount>>;

    async fn list_roles(&self) -> RepositoryResult<Vec<Role>>;

    async fn get_role(&self, id: RoleId) -> RepositoryResult<Option<Role>>;

    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no role has this id
    async fn update_role(&self, id: RoleId, role: &RoleInput) -> RepositoryResult<Role>;

    /// Users holding the role keep existing with no role.
    async fn delete_role(&self, id: RoleId) -> RepositoryResult<()>;

    // ==================== Users ====================

    /// Insert a user; an active user also gets an opening status log.
    async fn create_user(&self, user: &NewUserRecord) -> RepositoryResult<User>;

    /// Users ascending by id with their role name.
    async fn list_users(&self) -> RepositoryResult<Vec<UserWithRole>>;

    async fn get_user(&self, id: UserId) -> RepositoryResult<Option<UserWithRole>>;

    async fn find_user_by_name(&self, user_name: &str) -> RepositoryResult<Option<User>>;

    /// Replace a user's profile.
    ///
    /// A status change writes a status log: activation opens one,
    /// deactivation closes the latest open one.
    async fn update_user(&self, id: UserId, update: &UserUpdateRecord) -> RepositoryResult<User>;

    async fn delete_user(&self, id: UserId) -> RepositoryResult<()>;

    /// Set the active flag and log the transition.
    ///
    /// Returns the updated user and the status log that was opened or the
    /// most recent one that was closed.
    async fn set_user_status(
        &self,
        id: UserId,
        active: bool,
        at: NaiveDateTime,
    ) -> RepositoryResult<(User, Option<StatusLog>)>;

    /// Users newest first with role details, latest session and latest
    /// status log. `id` restricts the result to one user.
    async fn user_overviews(&self, id: Option<UserId>) -> RepositoryResult<Vec<UserOverview>>;

    /// Whether the user name and the email are already taken.
    async fn name_and_email_taken(
        &self,
        user_name: &str,
        email: &str,
    ) -> RepositoryResult<(bool, bool)>;

    async fn counts(&self) -> RepositoryResult<UserCounts>;

    async fn record_failed_login(
        &self,
        id: UserId,
        failed_attempts: i32,
        on_hold_until: Option<NaiveDateTime>,
    ) -> RepositoryResult<()>;

    async fn clear_failed_logins(&self, id: UserId) -> RepositoryResult<()>;

    /// Store a new password digest. Returns `false` when no user matched.
    async fn set_password_hash(&self, user_name: &str, password_hash: &str)
        -> RepositoryResult<bool>;

    // ==================== Sessions ====================

    async fn open_session(&self, user_id: UserId, at: NaiveDateTime) -> RepositoryResult<SessionId>;

    async fn close_session(&self, id: SessionId, at: NaiveDateTime) -> RepositoryResult<()>;

    /// Sessions without a logout time, newest login first.
    async fn active_sessions(&self) -> RepositoryResult<Vec<ActiveSession>>;
}

/// Append-only application log (`sm_logs`).
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn insert_log(&self, entry: &NewAppLog, at: NaiveDateTime) -> RepositoryResult<LogId>;
}
