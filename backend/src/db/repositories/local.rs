//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. Observation rows are kept
//! per table; merges and aggregations run through the same pure functions the
//! service layer uses, so results match the SQL backend row for row.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::RwLock;

use crate::db::repository::*;
use crate::models::*;
use crate::services::averages::{average_merged, average_records};
use crate::services::buckets::TimeBuckets;
use crate::services::health;
use crate::services::merge::merge_streams;

/// In-memory local repository.
///
/// Cloning shares the underlying data.
///
/// # Example
/// ```
/// use marine_monitor::db::repositories::LocalRepository;
/// use marine_monitor::models::{ObservationRecord, Stream, StreamTable, Variant};
///
/// let repo = LocalRepository::new();
/// let at = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
///     .unwrap()
///     .and_hms_opt(0, 0, 0)
///     .unwrap();
/// repo.insert_observation(
///     StreamTable::new(Stream::Tide, Variant::Observed),
///     ObservationRecord::new(at, Some("ST1")).with_value("water_level", 1.2),
/// );
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

/// A stored application log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLog {
    pub id: LogId,
    pub entry: NewAppLog,
    pub log_time: NaiveDateTime,
}

struct LocalData {
    tables: HashMap<StreamTable, Vec<ObservationRecord>>,

    roles: BTreeMap<RoleId, Role>,
    users: BTreeMap<UserId, User>,
    sessions: Vec<SessionLog>,
    status_logs: Vec<StatusLog>,
    logs: Vec<StoredLog>,

    // ID counters
    next_role_id: i64,
    next_user_id: i64,
    next_session_id: i64,
    next_status_log_id: i64,
    next_log_id: i64,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            roles: BTreeMap::new(),
            users: BTreeMap::new(),
            sessions: Vec::new(),
            status_logs: Vec::new(),
            logs: Vec::new(),
            next_role_id: 1,
            next_user_id: 1,
            next_session_id: 1,
            next_status_log_id: 1,
            next_log_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalData {
    fn rows_in(
        &self,
        table: StreamTable,
        range: TimeRange,
        station_id: Option<&str>,
    ) -> Vec<ObservationRecord> {
        let mut rows: Vec<ObservationRecord> = self
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| range.contains(r.timestamp))
                    .filter(|r| station_id.map_or(true, |s| r.station_id.as_deref() == Some(s)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.timestamp);
        rows
    }

    fn merged(&self, variant: Variant, range: TimeRange, key: AlignmentKey) -> Vec<MergedRecord> {
        let rows = |stream| self.rows_in(StreamTable::new(stream, variant), range, None);
        merge_streams(
            &rows(Stream::Tide),
            &rows(Stream::Wave),
            &rows(Stream::Current),
            &rows(Stream::Wind),
            key,
        )
    }

    fn user_not_found(id: UserId) -> RepositoryError {
        RepositoryError::not_found_with_context(
            "User not found",
            ErrorContext::new("find_user").with_entity("user").with_entity_id(id),
        )
    }

    fn name_taken(&self, user_name: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.user_name == user_name && Some(u.id) != except)
    }

    fn open_status_log(&mut self, user_id: UserId, at: NaiveDateTime) -> StatusLog {
        let log = StatusLog {
            id: self.next_status_log_id,
            user_id,
            activated_at: Some(at),
            inactivated_at: None,
        };
        self.next_status_log_id += 1;
        self.status_logs.push(log.clone());
        log
    }

    /// Close the most recently activated open log of a user.
    fn close_latest_status_log(&mut self, user_id: UserId, at: NaiveDateTime) -> Option<StatusLog> {
        let log = self
            .status_logs
            .iter_mut()
            .filter(|l| l.user_id == user_id && l.inactivated_at.is_none())
            .max_by_key(|l| l.activated_at)?;
        log.inactivated_at = Some(at);
        Some(log.clone())
    }

    fn role_name(&self, role_id: Option<RoleId>) -> Option<String> {
        role_id
            .and_then(|id| self.roles.get(&id))
            .map(|r| r.name.clone())
    }

    fn overview(&self, user: &User) -> UserOverview {
        let role = user.role_id.and_then(|id| self.roles.get(&id));
        let session = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user.id)
            .max_by_key(|s| s.login_time);
        let status = self
            .status_logs
            .iter()
            .filter(|l| l.user_id == user.id)
            .max_by_key(|l| l.activated_at);

        UserOverview {
            user: user.clone(),
            role_name: role.map(|r| r.name.clone()),
            role_description: role.and_then(|r| r.description.clone()),
            role_permissions: role.map(|r| r.permissions.clone()),
            login_time: session.map(|s| s.login_time),
            logout_time: session.and_then(|s| s.logout_time),
            active_hours: session.and_then(|s| {
                s.logout_time
                    .map(|out| (out - s.login_time).num_seconds() as f64 / 3600.0)
            }),
            latest_status: status.and_then(|l| l.activated_at),
            status_changed_at: status.and_then(|l| l.inactivated_at),
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Add one row to a stream table.
    pub fn insert_observation(&self, table: StreamTable, record: ObservationRecord) {
        self.data
            .write()
            .tables
            .entry(table)
            .or_default()
            .push(record);
    }

    /// Add many rows to a stream table.
    pub fn insert_observations(
        &self,
        table: StreamTable,
        records: impl IntoIterator<Item = ObservationRecord>,
    ) {
        self.data
            .write()
            .tables
            .entry(table)
            .or_default()
            .extend(records);
    }

    /// Simulate losing (or regaining) the store.
    ///
    /// While unhealthy every operation fails with a connection error.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Application log entries written so far.
    pub fn log_entries(&self) -> Vec<StoredLog> {
        self.data.read().logs.clone()
    }

    /// Session logs of a user.
    pub fn sessions_of(&self, user_id: UserId) -> Vec<SessionLog> {
        self.data
            .read()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Status logs of a user, oldest first.
    pub fn status_logs_of(&self, user_id: UserId) -> Vec<StatusLog> {
        self.data
            .read()
            .status_logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect()
    }

    fn ensure_healthy(&self, operation: &str) -> RepositoryResult<()> {
        if self.data.read().is_healthy {
            Ok(())
        } else {
            Err(RepositoryError::connection_with_context(
                "Local repository is unavailable",
                ErrorContext::new(operation),
            ))
        }
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn fetch_stream(
        &self,
        table: StreamTable,
        range: TimeRange,
        station_id: Option<&str>,
    ) -> RepositoryResult<Vec<ObservationRecord>> {
        self.ensure_healthy("fetch_stream")?;
        Ok(self.data.read().rows_in(table, range, station_id))
    }

    async fn fetch_latest(&self, table: StreamTable) -> RepositoryResult<Option<ObservationRecord>> {
        self.ensure_healthy("fetch_latest")?;
        let data = self.data.read();
        Ok(data
            .tables
            .get(&table)
            .and_then(|rows| rows.iter().max_by_key(|r| r.timestamp))
            .cloned())
    }

    async fn last_timestamp(
        &self,
        table: StreamTable,
        range: TimeRange,
    ) -> RepositoryResult<Option<NaiveDateTime>> {
        self.ensure_healthy("last_timestamp")?;
        let data = self.data.read();
        Ok(data.tables.get(&table).and_then(|rows| {
            rows.iter()
                .map(|r| r.timestamp)
                .filter(|ts| range.contains(*ts))
                .max()
        }))
    }

    async fn fetch_merged(
        &self,
        variant: Variant,
        range: TimeRange,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<MergedRecord>> {
        self.ensure_healthy("fetch_merged")?;
        Ok(self.data.read().merged(variant, range, key))
    }

    async fn hourly_averages(
        &self,
        table: StreamTable,
        fields: &[Field],
        range: TimeRange,
        station_id: Option<&str>,
    ) -> RepositoryResult<Vec<FieldAverages>> {
        self.ensure_healthy("hourly_averages")?;
        let rows = self.data.read().rows_in(table, range, station_id);
        Ok(average_records(&rows, fields, GroupWindow::Hour))
    }

    async fn six_hour_averages(
        &self,
        variant: Variant,
        range: TimeRange,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<FieldAverages>> {
        self.ensure_healthy("six_hour_averages")?;
        let merged = self.data.read().merged(variant, range, key);
        Ok(average_merged(&merged, GroupWindow::SixHour))
    }

    async fn bucket_presence(
        &self,
        variant: Variant,
        buckets: &TimeBuckets,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<BucketPresence>> {
        self.ensure_healthy("bucket_presence")?;
        let merged = self.data.read().merged(variant, buckets.range(), key);
        Ok(health::bucket_presence(&merged, buckets))
    }
}

#[async_trait]
impl UserRepository for LocalRepository {
    async fn create_role(&self, role: &RoleInput) -> RepositoryResult<Role> {
        self.ensure_healthy("create_role")?;
        let mut data = self.data.write();
        let id = RoleId::new(data.next_role_id);
        data.next_role_id += 1;
        let stored = Role {
            id,
            name: role.name.clone(),
            description: role.description.clone(),
            permissions: role.permissions.clone(),
        };
        data.roles.insert(id, stored.clone());
        Ok(stored)
    }

    async fn list_roles_with_counts(&self) -> RepositoryResult<Vec<RoleWithCount>> {
        self.ensure_healthy("list_roles_with_counts")?;
        let data = self.data.read();
        Ok(data
            .roles
            .values()
            .map(|role| RoleWithCount {
                role: role.clone(),
                user_count: data
                    .users
                    .values()
                    .filter(|u| u.role_id == Some(role.id))
                    .count() as i64,
            })
            .collect())
    }

    async fn list_roles(&self) -> RepositoryResult<Vec<Role>> {
        self.ensure_healthy("list_roles")?;
        Ok(self.data.read().roles.values().cloned().collect())
    }

    async fn get_role(&self, id: RoleId) -> RepositoryResult<Option<Role>> {
        self.ensure_healthy("get_role")?;
        Ok(self.data.read().roles.get(&id).cloned())
    }

    async fn update_role(&self, id: RoleId, role: &RoleInput) -> RepositoryResult<Role> {
        self.ensure_healthy("update_role")?;
        let mut data = self.data.write();
        let stored = data.roles.get_mut(&id).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                "Role not found",
                ErrorContext::new("update_role").with_entity("role").with_entity_id(id),
            )
        })?;
        stored.name = role.name.clone();
        stored.description = role.description.clone();
        stored.permissions = role.permissions.clone();
        Ok(stored.clone())
    }

    async fn delete_role(&self, id: RoleId) -> RepositoryResult<()> {
        self.ensure_healthy("delete_role")?;
        let mut data = self.data.write();
        if data.roles.remove(&id).is_none() {
            return Err(RepositoryError::not_found_with_context(
                "Role not found",
                ErrorContext::new("delete_role").with_entity("role").with_entity_id(id),
            ));
        }
        for user in data.users.values_mut() {
            if user.role_id == Some(id) {
                user.role_id = None;
            }
        }
        Ok(())
    }

    async fn create_user(&self, user: &NewUserRecord) -> RepositoryResult<User> {
        self.ensure_healthy("create_user")?;
        let mut data = self.data.write();
        if data.name_taken(&user.user_name, None) {
            return Err(RepositoryError::query_with_context(
                "duplicate key value violates unique constraint \"sm_users_user_name_key\"",
                ErrorContext::new("create_user").with_entity("user"),
            ));
        }

        let id = UserId::new(data.next_user_id);
        data.next_user_id += 1;
        let stored = User {
            id,
            full_name: user.full_name.clone(),
            user_name: user.user_name.clone(),
            email: user.email.clone(),
            designation: user.designation.clone(),
            role_id: user.role_id,
            status: user.status,
            is_admin: user.is_admin,
            parameters: user.parameters.clone(),
            created_at: user.created_at,
            failed_attempts: 0,
            on_hold_time: None,
            password_hash: user.password_hash.clone(),
        };
        data.users.insert(id, stored.clone());
        if stored.status {
            data.open_status_log(id, user.created_at);
        }
        Ok(stored)
    }

    async fn list_users(&self) -> RepositoryResult<Vec<UserWithRole>> {
        self.ensure_healthy("list_users")?;
        let data = self.data.read();
        Ok(data
            .users
            .values()
            .map(|u| UserWithRole {
                user: u.clone(),
                role_name: data.role_name(u.role_id),
            })
            .collect())
    }

    async fn get_user(&self, id: UserId) -> RepositoryResult<Option<UserWithRole>> {
        self.ensure_healthy("get_user")?;
        let data = self.data.read();
        Ok(data.users.get(&id).map(|u| UserWithRole {
            user: u.clone(),
            role_name: data.role_name(u.role_id),
        }))
    }

    async fn find_user_by_name(&self, user_name: &str) -> RepositoryResult<Option<User>> {
        self.ensure_healthy("find_user_by_name")?;
        Ok(self
            .data
            .read()
            .users
            .values()
            .find(|u| u.user_name == user_name)
            .cloned())
    }

    async fn update_user(&self, id: UserId, update: &UserUpdateRecord) -> RepositoryResult<User> {
        self.ensure_healthy("update_user")?;
        let mut data = self.data.write();
        let previous = data
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| LocalData::user_not_found(id))?;
        if data.name_taken(&update.user_name, Some(id)) {
            return Err(RepositoryError::query_with_context(
                "duplicate key value violates unique constraint \"sm_users_user_name_key\"",
                ErrorContext::new("update_user").with_entity("user").with_entity_id(id),
            ));
        }

        let mut user = previous.clone();
        user.full_name = update.full_name.clone();
        user.user_name = update.user_name.clone();
        user.email = update.email.clone();
        user.designation = update.designation.clone();
        user.role_id = update.role_id;
        user.status = update.status;
        user.parameters = update.parameters.clone();
        if let Some(hash) = &update.password_hash {
            user.password_hash = hash.clone();
        }

        if previous.status != update.status {
            if update.status {
                data.open_status_log(id, update.at);
            } else {
                data.close_latest_status_log(id, update.at);
            }
        }
        data.users.insert(id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: UserId) -> RepositoryResult<()> {
        self.ensure_healthy("delete_user")?;
        let mut data = self.data.write();
        if data.users.remove(&id).is_none() {
            return Err(LocalData::user_not_found(id));
        }
        data.sessions.retain(|s| s.user_id != id);
        data.status_logs.retain(|l| l.user_id != id);
        Ok(())
    }

    async fn set_user_status(
        &self,
        id: UserId,
        active: bool,
        at: NaiveDateTime,
    ) -> RepositoryResult<(User, Option<StatusLog>)> {
        self.ensure_healthy("set_user_status")?;
        let mut data = self.data.write();
        let user = data
            .users
            .get_mut(&id)
            .ok_or_else(|| LocalData::user_not_found(id))?;
        user.status = active;
        let user = user.clone();

        let log = if active {
            Some(data.open_status_log(id, at))
        } else {
            let mut closed = None;
            while let Some(log) = data.close_latest_status_log(id, at) {
                closed.get_or_insert(log);
            }
            closed
        };
        Ok((user, log))
    }

    async fn user_overviews(&self, id: Option<UserId>) -> RepositoryResult<Vec<UserOverview>> {
        self.ensure_healthy("user_overviews")?;
        let data = self.data.read();
        let mut users: Vec<&User> = data
            .users
            .values()
            .filter(|u| id.map_or(true, |id| u.id == id))
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users.into_iter().map(|u| data.overview(u)).collect())
    }

    async fn name_and_email_taken(
        &self,
        user_name: &str,
        email: &str,
    ) -> RepositoryResult<(bool, bool)> {
        self.ensure_healthy("name_and_email_taken")?;
        let data = self.data.read();
        Ok((
            data.users.values().any(|u| u.user_name == user_name),
            data.users.values().any(|u| u.email == email),
        ))
    }

    async fn counts(&self) -> RepositoryResult<UserCounts> {
        self.ensure_healthy("counts")?;
        let data = self.data.read();
        let active = data.users.values().filter(|u| u.status).count() as i64;
        let total = data.users.len() as i64;
        Ok(UserCounts {
            total_users: total,
            total_roles: data.roles.len() as i64,
            active_users: active,
            inactive_users: total - active,
        })
    }

    async fn record_failed_login(
        &self,
        id: UserId,
        failed_attempts: i32,
        on_hold_until: Option<NaiveDateTime>,
    ) -> RepositoryResult<()> {
        self.ensure_healthy("record_failed_login")?;
        let mut data = self.data.write();
        let user = data
            .users
            .get_mut(&id)
            .ok_or_else(|| LocalData::user_not_found(id))?;
        user.failed_attempts = failed_attempts;
        if on_hold_until.is_some() {
            user.on_hold_time = on_hold_until;
        }
        Ok(())
    }

    async fn clear_failed_logins(&self, id: UserId) -> RepositoryResult<()> {
        self.ensure_healthy("clear_failed_logins")?;
        let mut data = self.data.write();
        let user = data
            .users
            .get_mut(&id)
            .ok_or_else(|| LocalData::user_not_found(id))?;
        user.failed_attempts = 0;
        user.on_hold_time = None;
        Ok(())
    }

    async fn set_password_hash(
        &self,
        user_name: &str,
        password_hash: &str,
    ) -> RepositoryResult<bool> {
        self.ensure_healthy("set_password_hash")?;
        let mut data = self.data.write();
        match data.users.values_mut().find(|u| u.user_name == user_name) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn open_session(&self, user_id: UserId, at: NaiveDateTime) -> RepositoryResult<SessionId> {
        self.ensure_healthy("open_session")?;
        let mut data = self.data.write();
        if !data.users.contains_key(&user_id) {
            return Err(LocalData::user_not_found(user_id));
        }
        let id = SessionId::new(data.next_session_id);
        data.next_session_id += 1;
        data.sessions.push(SessionLog {
            id,
            user_id,
            login_time: at,
            logout_time: None,
        });
        Ok(id)
    }

    async fn close_session(&self, id: SessionId, at: NaiveDateTime) -> RepositoryResult<()> {
        self.ensure_healthy("close_session")?;
        let mut data = self.data.write();
        let session = data.sessions.iter_mut().find(|s| s.id == id).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                "Session not found",
                ErrorContext::new("close_session").with_entity("session").with_entity_id(id),
            )
        })?;
        session.logout_time = Some(at);
        Ok(())
    }

    async fn active_sessions(&self) -> RepositoryResult<Vec<ActiveSession>> {
        self.ensure_healthy("active_sessions")?;
        let data = self.data.read();
        let mut sessions: Vec<ActiveSession> = data
            .sessions
            .iter()
            .filter(|s| s.logout_time.is_none())
            .filter_map(|s| {
                data.users.get(&s.user_id).map(|u| ActiveSession {
                    session_id: s.id,
                    user_id: s.user_id,
                    login_time: s.login_time,
                    user_name: u.user_name.clone(),
                    full_name: u.full_name.clone(),
                })
            })
            .collect();
        sessions.sort_by(|a, b| b.login_time.cmp(&a.login_time));
        Ok(sessions)
    }
}

#[async_trait]
impl LogRepository for LocalRepository {
    async fn insert_log(&self, entry: &NewAppLog, at: NaiveDateTime) -> RepositoryResult<LogId> {
        self.ensure_healthy("insert_log")?;
        let mut data = self.data.write();
        let id = LogId::new(data.next_log_id);
        data.next_log_id += 1;
        data.logs.push(StoredLog {
            id,
            entry: entry.clone(),
            log_time: at,
        });
        Ok(id)
    }
}
