//! User administration and login bookkeeping.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{
    ActiveSession, NewUser, NewUserRecord, Role, RoleId, RoleInput, SessionId, StatusLog, User,
    UserId, UserUpdate, UserUpdateRecord,
};

/// Password digest primitive.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> RepositoryResult<String>;
    fn verify(&self, plain: &str, digest: &str) -> RepositoryResult<bool>;
}

/// bcrypt digests, compatible with rows written by other bcrypt clients.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plain: &str) -> RepositoryResult<String> {
        bcrypt::hash(plain, self.cost)
            .map_err(|e| RepositoryError::internal(format!("password hashing failed: {}", e)))
    }

    fn verify(&self, plain: &str, digest: &str) -> RepositoryResult<bool> {
        // A malformed stored digest simply does not match.
        Ok(bcrypt::verify(plain, digest).unwrap_or(false))
    }
}

async fn hash_password(hasher: &Arc<dyn PasswordHasher>, plain: &str) -> RepositoryResult<String> {
    let hasher = Arc::clone(hasher);
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&plain))
        .await
        .map_err(|e| RepositoryError::internal(format!("hashing task failed: {}", e)))?
}

async fn verify_password(
    hasher: &Arc<dyn PasswordHasher>,
    plain: &str,
    digest: &str,
) -> RepositoryResult<bool> {
    let hasher = Arc::clone(hasher);
    let plain = plain.to_string();
    let digest = digest.to_string();
    tokio::task::spawn_blocking(move || hasher.verify(&plain, &digest))
        .await
        .map_err(|e| RepositoryError::internal(format!("verification task failed: {}", e)))?
}

fn require(value: &str, name: &str, operation: &str) -> RepositoryResult<()> {
    if value.trim().is_empty() {
        return Err(RepositoryError::validation_with_context(
            format!("{} is required", name),
            ErrorContext::new(operation),
        ));
    }
    Ok(())
}

/// Failed-login lockout rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginPolicy {
    pub max_failed_attempts: i32,
    pub lockout: Duration,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 3,
            lockout: Duration::hours(1),
        }
    }
}

// ==================== Roles ====================

pub async fn add_role(repo: &dyn FullRepository, input: &RoleInput) -> RepositoryResult<Role> {
    require(&input.name, "name", "add_role")?;
    repo.create_role(input).await
}

pub async fn update_role(
    repo: &dyn FullRepository,
    id: RoleId,
    input: &RoleInput,
) -> RepositoryResult<Role> {
    require(&input.name, "name", "update_role")?;
    repo.update_role(id, input).await
}

// ==================== Users ====================

/// Create a user with a hashed password.
pub async fn add_user(
    repo: &dyn FullRepository,
    hasher: &Arc<dyn PasswordHasher>,
    input: NewUser,
    now: NaiveDateTime,
) -> RepositoryResult<User> {
    require(&input.user_name, "user_name", "add_user")?;
    require(&input.email, "email", "add_user")?;
    require(&input.password, "password", "add_user")?;

    let password_hash = hash_password(hasher, &input.password).await?;
    let record = NewUserRecord {
        full_name: input.full_name,
        user_name: input.user_name,
        email: input.email,
        designation: input.designation,
        role_id: input.role_id,
        status: input.status,
        password_hash,
        is_admin: input.is_admin,
        parameters: input.parameters.unwrap_or_else(|| json!({})),
        created_at: now,
    };
    let user = repo.create_user(&record).await?;
    tracing::info!(user_id = %user.id, "user created");
    Ok(user)
}

/// Replace a user's profile; the password is re-hashed only when supplied.
pub async fn update_user(
    repo: &dyn FullRepository,
    hasher: &Arc<dyn PasswordHasher>,
    id: UserId,
    input: UserUpdate,
    now: NaiveDateTime,
) -> RepositoryResult<User> {
    require(&input.user_name, "user_name", "update_user")?;
    require(&input.email, "email", "update_user")?;

    let password_hash = match input.password.as_deref().filter(|p| !p.is_empty()) {
        Some(plain) => Some(hash_password(hasher, plain).await?),
        None => None,
    };
    let record = UserUpdateRecord {
        full_name: input.full_name,
        user_name: input.user_name,
        email: input.email,
        designation: input.designation,
        role_id: input.role_id,
        status: input.status,
        password_hash,
        parameters: input.parameters.unwrap_or_else(|| json!({})),
        at: now,
    };
    repo.update_user(id, &record).await
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub user: User,
    pub log: Option<StatusLog>,
}

pub async fn update_status(
    repo: &dyn FullRepository,
    id: UserId,
    active: bool,
    now: NaiveDateTime,
) -> RepositoryResult<StatusChange> {
    let (user, log) = repo.set_user_status(id, active, now).await?;
    tracing::info!(user_id = %id, active, "user status changed");
    Ok(StatusChange { user, log })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameCheck {
    pub username_exists: bool,
    pub email_exists: bool,
}

pub async fn check_username(
    repo: &dyn FullRepository,
    user_name: &str,
    email: &str,
) -> RepositoryResult<NameCheck> {
    let (username_exists, email_exists) = repo.name_and_email_taken(user_name, email).await?;
    Ok(NameCheck {
        username_exists,
        email_exists,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveSessions {
    pub count: usize,
    pub users: Vec<ActiveSession>,
}

pub async fn active_sessions(repo: &dyn FullRepository) -> RepositoryResult<ActiveSessions> {
    let users = repo.active_sessions().await?;
    Ok(ActiveSessions {
        count: users.len(),
        users,
    })
}

// ==================== Login ====================

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginUser {
    pub id: UserId,
    pub full_name: String,
    pub user_name: String,
    pub role: Option<String>,
    pub permissions: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginSuccess {
    pub message: &'static str,
    pub user: LoginUser,
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Success(LoginSuccess),
    UnknownUser,
    Inactive,
    /// Still on hold from earlier failures.
    OnHold { minutes_left: i64 },
    /// This failure reached the attempt limit.
    LockedOut,
    WrongPassword,
}

impl LoginOutcome {
    /// Message shown to the user for a refused login.
    pub fn message(&self) -> String {
        match self {
            LoginOutcome::Success(s) => s.message.to_string(),
            LoginOutcome::UnknownUser => "User not found".to_string(),
            LoginOutcome::Inactive => "User is not active. Please contact admin.".to_string(),
            LoginOutcome::OnHold { minutes_left } => {
                format!("Account locked. Try again after {} minutes.", minutes_left)
            }
            LoginOutcome::LockedOut => {
                "Account locked due to multiple failed attempts.".to_string()
            }
            LoginOutcome::WrongPassword => "Invalid password".to_string(),
        }
    }
}

/// Role permissions as JSON. String-encoded permissions are parsed; an
/// unparsable string yields `{}`.
pub fn normalize_permissions(permissions: &Value) -> Value {
    match permissions {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "role permissions are not valid JSON");
            json!({})
        }),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

fn minutes_until(now: NaiveDateTime, until: NaiveDateTime) -> i64 {
    let ms = (until - now).num_milliseconds();
    (ms + 59_999) / 60_000
}

/// Check credentials, apply the lockout policy and open a session.
pub async fn login(
    repo: &dyn FullRepository,
    hasher: &Arc<dyn PasswordHasher>,
    policy: LoginPolicy,
    credentials: &Credentials,
    now: NaiveDateTime,
) -> RepositoryResult<LoginOutcome> {
    let Some(user) = repo.find_user_by_name(&credentials.user_name).await? else {
        tracing::info!(user_name = %credentials.user_name, "login for unknown user");
        return Ok(LoginOutcome::UnknownUser);
    };

    if !user.status {
        return Ok(LoginOutcome::Inactive);
    }

    if let Some(until) = user.on_hold_time.filter(|until| *until > now) {
        return Ok(LoginOutcome::OnHold {
            minutes_left: minutes_until(now, until),
        });
    }

    if !verify_password(hasher, &credentials.password, &user.password_hash).await? {
        let attempts = user.failed_attempts + 1;
        if attempts >= policy.max_failed_attempts {
            repo.record_failed_login(user.id, attempts, Some(now + policy.lockout))
                .await?;
            tracing::warn!(user_id = %user.id, attempts, "account locked");
            return Ok(LoginOutcome::LockedOut);
        }
        repo.record_failed_login(user.id, attempts, None).await?;
        return Ok(LoginOutcome::WrongPassword);
    }

    let role = match user.role_id {
        Some(role_id) => repo.get_role(role_id).await?,
        None => None,
    };
    let permissions = role
        .as_ref()
        .map(|r| normalize_permissions(&r.permissions))
        .unwrap_or_else(|| json!({}));

    repo.clear_failed_logins(user.id).await?;
    let session_id = repo.open_session(user.id, now).await?;
    tracing::info!(user_id = %user.id, session_id = %session_id, "login successful");

    Ok(LoginOutcome::Success(LoginSuccess {
        message: "Login successful",
        user: LoginUser {
            id: user.id,
            full_name: user.full_name,
            user_name: user.user_name,
            role: role.map(|r| r.name),
            permissions,
        },
        session_id,
    }))
}

pub async fn logout(
    repo: &dyn FullRepository,
    session_id: SessionId,
    now: NaiveDateTime,
) -> RepositoryResult<()> {
    repo.close_session(session_id, now).await
}

// ==================== Password recovery ====================

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryRequest {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email_id: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl RecoveryCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn failed(reason: &'static str) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Whether the user name exists and the email belongs to it.
pub async fn forgot_request(
    repo: &dyn FullRepository,
    request: &RecoveryRequest,
) -> RepositoryResult<RecoveryCheck> {
    let Some(user) = repo.find_user_by_name(&request.user_name).await? else {
        return Ok(RecoveryCheck::failed("username"));
    };
    if user.email != request.email_id {
        return Ok(RecoveryCheck::failed("email"));
    }
    Ok(RecoveryCheck::ok())
}

/// Like [`forgot_request`], additionally checking the password.
pub async fn verify_user(
    repo: &dyn FullRepository,
    hasher: &Arc<dyn PasswordHasher>,
    request: &RecoveryRequest,
) -> RepositoryResult<RecoveryCheck> {
    let Some(user) = repo.find_user_by_name(&request.user_name).await? else {
        return Ok(RecoveryCheck::failed("username"));
    };
    if user.email != request.email_id {
        return Ok(RecoveryCheck::failed("email"));
    }
    let password = request.password.as_deref().unwrap_or_default();
    if !verify_password(hasher, password, &user.password_hash).await? {
        return Ok(RecoveryCheck::failed("password"));
    }
    Ok(RecoveryCheck::ok())
}

pub async fn reset_password(
    repo: &dyn FullRepository,
    hasher: &Arc<dyn PasswordHasher>,
    user_name: &str,
    new_password: &str,
) -> RepositoryResult<()> {
    require(new_password, "newPassword", "reset_password")?;
    let digest = hash_password(hasher, new_password).await?;
    if !repo.set_password_hash(user_name, &digest).await? {
        return Err(RepositoryError::not_found_with_context(
            "User not found",
            ErrorContext::new("reset_password").with_entity("user"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod users_tests;
