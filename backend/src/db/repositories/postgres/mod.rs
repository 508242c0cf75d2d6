//! Postgres repository implementation using Diesel.
//!
//! Observation tables are read through the parameterised statements built in
//! [`crate::db::query`]; user administration tables go through the Diesel
//! DSL over [`schema`].
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Connection health monitoring
//! - Automatic migration execution
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::dsl::{count_star, exists};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Text, Timestamp};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Deserialize;
use serde_json::Value;
use tokio::task;

use crate::db::query::{self, BindValue, QuerySpec};
use crate::db::repository::{
    ErrorContext, LogRepository, ObservationRepository, RepositoryError, RepositoryResult,
    UserRepository,
};
use crate::models::*;
use crate::services::buckets::TimeBuckets;

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the variables read.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let defaults = Self::default();
        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub connections_in_use: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Total number of connections in the pool
    pub total_connections: u32,
    /// Maximum pool size
    pub max_size: u32,
    /// Total queries executed
    pub total_queries: u64,
    /// Total failed queries
    pub failed_queries: u64,
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    total_queries: Arc<AtomicU64>,
    failed_queries: Arc<AtomicU64>,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self {
            pool,
            config,
            total_queries: Arc::new(AtomicU64::new(0)),
            failed_queries: Arc::new(AtomicU64::new(0)),
        })
    }

    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;
        Ok(())
    }

    /// Run a blocking Diesel operation on a pooled connection.
    ///
    /// Failures surface immediately; there is no retry.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();

        task::spawn_blocking(move || {
            // r2d2 only fails a checkout once `connection_timeout` has elapsed.
            let mut conn = pool.get().map_err(|e| {
                failed_queries.fetch_add(1, Ordering::Relaxed);
                RepositoryError::timeout_with_context(e.to_string(), ErrorContext::new("get_connection"))
            })?;
            total_queries.fetch_add(1, Ordering::Relaxed);
            let result = f(&mut conn);
            if result.is_err() {
                failed_queries.fetch_add(1, Ordering::Relaxed);
            }
            result
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Get pool health statistics.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
        }
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

/// Bind a [`QuerySpec`] and load its rows.
fn load_query<R>(conn: &mut PgConnection, q: QuerySpec) -> RepositoryResult<Vec<R>>
where
    R: QueryableByName<Pg> + 'static,
{
    let mut query = sql_query(q.sql).into_boxed::<Pg>();
    for bind in q.binds {
        query = match bind {
            BindValue::Timestamp(ts) => query.bind::<Timestamp, _>(ts),
            BindValue::Text(text) => query.bind::<Text, _>(text),
            BindValue::BigInt(n) => query.bind::<BigInt, _>(n),
            BindValue::TimestampArray(values) => query.bind::<Array<Timestamp>, _>(values),
        };
    }
    query.load::<R>(conn).map_err(map_diesel_error)
}

fn observation_from_json(row: JsonRow) -> RepositoryResult<ObservationRecord> {
    serde_json::from_value(row.data).map_err(|e| {
        RepositoryError::internal_with_context(
            format!("Malformed observation row: {}", e),
            ErrorContext::new("decode_observation"),
        )
    })
}

fn merged_from_row(row: MergedRow) -> MergedRecord {
    let mut record = MergedRecord::empty(row.timestamp, row.station_id);
    if let Value::Object(values) = row.values {
        for field in Field::TRACKED {
            if let Some(value) = values.get(field.column()) {
                record.values.insert(field, value.clone());
            }
        }
    }
    record
}

fn averages_from_row(row: AverageRow, fields: &[Field]) -> FieldAverages {
    FieldAverages {
        period: row.period,
        station_id: row.station_id,
        averages: fields
            .iter()
            .map(|f| (*f, row.averages.get(f.column()).and_then(numeric)))
            .collect(),
    }
}

fn presence_from_row(row: PresenceRow, buckets: &TimeBuckets) -> RepositoryResult<BucketPresence> {
    let bucket = usize::try_from(row.idx - 1)
        .ok()
        .and_then(|i| buckets.as_slice().get(i))
        .copied()
        .ok_or_else(|| {
            RepositoryError::internal_with_context(
                format!("bucket index {} out of range", row.idx),
                ErrorContext::new("bucket_presence"),
            )
        })?;
    let present = Field::TRACKED
        .iter()
        .map(|f| {
            let n = row.present.get(f.column()).and_then(Value::as_u64).unwrap_or(0);
            (*f, n)
        })
        .collect();
    Ok(BucketPresence {
        bucket,
        counts: PresenceCounts {
            total_records: row.total_records.max(0) as u64,
            present,
        },
    })
}

#[async_trait]
impl ObservationRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn fetch_stream(
        &self,
        table: StreamTable,
        range: TimeRange,
        station_id: Option<&str>,
    ) -> RepositoryResult<Vec<ObservationRecord>> {
        let q = query::stream_range(table, range, station_id);
        self.with_conn(move |conn| {
            load_query::<JsonRow>(conn, q)?
                .into_iter()
                .map(observation_from_json)
                .collect()
        })
        .await
    }

    async fn fetch_latest(&self, table: StreamTable) -> RepositoryResult<Option<ObservationRecord>> {
        let q = query::stream_latest(table);
        self.with_conn(move |conn| {
            load_query::<JsonRow>(conn, q)?
                .into_iter()
                .next()
                .map(observation_from_json)
                .transpose()
        })
        .await
    }

    async fn last_timestamp(
        &self,
        table: StreamTable,
        range: TimeRange,
    ) -> RepositoryResult<Option<NaiveDateTime>> {
        let q = query::last_timestamp(table, range);
        self.with_conn(move |conn| {
            Ok(load_query::<LastTimestampRow>(conn, q)?
                .into_iter()
                .next()
                .and_then(|r| r.last))
        })
        .await
    }

    async fn fetch_merged(
        &self,
        variant: Variant,
        range: TimeRange,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<MergedRecord>> {
        let q = query::merged_range(variant, range, key);
        self.with_conn(move |conn| {
            Ok(load_query::<MergedRow>(conn, q)?
                .into_iter()
                .map(merged_from_row)
                .collect())
        })
        .await
    }

    async fn hourly_averages(
        &self,
        table: StreamTable,
        fields: &[Field],
        range: TimeRange,
        station_id: Option<&str>,
    ) -> RepositoryResult<Vec<FieldAverages>> {
        let q = query::hourly_average(table, fields, range, station_id);
        let fields = fields.to_vec();
        self.with_conn(move |conn| {
            Ok(load_query::<AverageRow>(conn, q)?
                .into_iter()
                .map(|row| averages_from_row(row, &fields))
                .collect())
        })
        .await
    }

    async fn six_hour_averages(
        &self,
        variant: Variant,
        range: TimeRange,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<FieldAverages>> {
        let q = query::six_hour_average(variant, range, key);
        self.with_conn(move |conn| {
            Ok(load_query::<AverageRow>(conn, q)?
                .into_iter()
                .map(|row| averages_from_row(row, &Field::TRACKED))
                .collect())
        })
        .await
    }

    async fn bucket_presence(
        &self,
        variant: Variant,
        buckets: &TimeBuckets,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<BucketPresence>> {
        let q = query::bucket_presence(variant, buckets, key);
        let buckets = buckets.clone();
        self.with_conn(move |conn| {
            load_query::<PresenceRow>(conn, q)?
                .into_iter()
                .map(|row| presence_from_row(row, &buckets))
                .collect()
        })
        .await
    }
}

fn role_not_found(operation: &str, id: RoleId) -> RepositoryError {
    RepositoryError::not_found_with_context(
        "Role not found",
        ErrorContext::new(operation).with_entity("role").with_entity_id(id),
    )
}

fn user_not_found(operation: &str, id: UserId) -> RepositoryError {
    RepositoryError::not_found_with_context(
        "User not found",
        ErrorContext::new(operation).with_entity("user").with_entity_id(id),
    )
}

fn role_changeset(role: &RoleInput) -> RoleChangeset {
    RoleChangeset {
        name: role.name.clone(),
        description: role.description.clone(),
        permissions: role.permissions.clone(),
    }
}

fn open_status_log(
    conn: &mut PgConnection,
    user_id: i64,
    at: NaiveDateTime,
) -> RepositoryResult<StatusLogRow> {
    diesel::insert_into(sm_status_logs::table)
        .values((
            sm_status_logs::user_id.eq(user_id),
            sm_status_logs::activated_at.eq(Some(at)),
        ))
        .returning(StatusLogRow::as_returning())
        .get_result(conn)
        .map_err(map_diesel_error)
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn create_role(&self, role: &RoleInput) -> RepositoryResult<Role> {
        let row = role_changeset(role);
        self.with_conn(move |conn| {
            diesel::insert_into(sm_roles::table)
                .values(&row)
                .returning(RoleRow::as_returning())
                .get_result(conn)
                .map(Role::from)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn list_roles_with_counts(&self) -> RepositoryResult<Vec<RoleWithCount>> {
        self.with_conn(|conn| {
            let roles = sm_roles::table
                .select(RoleRow::as_select())
                .order(sm_roles::id.asc())
                .load::<RoleRow>(conn)
                .map_err(map_diesel_error)?;
            let counts: HashMap<Option<i64>, i64> = sm_users::table
                .group_by(sm_users::role_id)
                .select((sm_users::role_id, count_star()))
                .load::<(Option<i64>, i64)>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .collect();

            Ok(roles
                .into_iter()
                .map(|row| {
                    let user_count = counts.get(&Some(row.id)).copied().unwrap_or(0);
                    RoleWithCount {
                        role: row.into(),
                        user_count,
                    }
                })
                .collect())
        })
        .await
    }

    async fn list_roles(&self) -> RepositoryResult<Vec<Role>> {
        self.with_conn(|conn| {
            Ok(sm_roles::table
                .select(RoleRow::as_select())
                .order(sm_roles::id.asc())
                .load::<RoleRow>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(Role::from)
                .collect())
        })
        .await
    }

    async fn get_role(&self, id: RoleId) -> RepositoryResult<Option<Role>> {
        self.with_conn(move |conn| {
            sm_roles::table
                .find(id.value())
                .select(RoleRow::as_select())
                .first::<RoleRow>(conn)
                .optional()
                .map(|row| row.map(Role::from))
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn update_role(&self, id: RoleId, role: &RoleInput) -> RepositoryResult<Role> {
        let changes = role_changeset(role);
        self.with_conn(move |conn| {
            diesel::update(sm_roles::table.find(id.value()))
                .set(&changes)
                .returning(RoleRow::as_returning())
                .get_result::<RoleRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(Role::from)
                .ok_or_else(|| role_not_found("update_role", id))
        })
        .await
    }

    async fn delete_role(&self, id: RoleId) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let deleted = diesel::delete(sm_roles::table.find(id.value()))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if deleted == 0 {
                return Err(role_not_found("delete_role", id));
            }
            Ok(())
        })
        .await
    }

    async fn create_user(&self, user: &NewUserRecord) -> RepositoryResult<User> {
        let row = NewUserRow {
            full_name: user.full_name.clone(),
            user_name: user.user_name.clone(),
            email: user.email.clone(),
            designation: user.designation.clone(),
            role_id: user.role_id.map(|r| r.value()),
            status: user.status,
            password: user.password_hash.clone(),
            is_admin: user.is_admin,
            parameters: user.parameters.clone(),
            created_at: user.created_at,
        };
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let inserted = diesel::insert_into(sm_users::table)
                    .values(&row)
                    .returning(UserRow::as_returning())
                    .get_result::<UserRow>(tx)
                    .map_err(map_diesel_error)?;
                if inserted.status {
                    open_status_log(tx, inserted.id, inserted.created_at)?;
                }
                Ok(User::from(inserted))
            })
        })
        .await
    }

    async fn list_users(&self) -> RepositoryResult<Vec<UserWithRole>> {
        self.with_conn(|conn| {
            Ok(sm_users::table
                .left_join(sm_roles::table)
                .select((UserRow::as_select(), sm_roles::name.nullable()))
                .order(sm_users::id.asc())
                .load::<(UserRow, Option<String>)>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(|(user, role_name)| UserWithRole {
                    user: user.into(),
                    role_name,
                })
                .collect())
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> RepositoryResult<Option<UserWithRole>> {
        self.with_conn(move |conn| {
            Ok(sm_users::table
                .left_join(sm_roles::table)
                .filter(sm_users::id.eq(id.value()))
                .select((UserRow::as_select(), sm_roles::name.nullable()))
                .first::<(UserRow, Option<String>)>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(|(user, role_name)| UserWithRole {
                    user: user.into(),
                    role_name,
                }))
        })
        .await
    }

    async fn find_user_by_name(&self, user_name: &str) -> RepositoryResult<Option<User>> {
        let user_name = user_name.to_string();
        self.with_conn(move |conn| {
            sm_users::table
                .filter(sm_users::user_name.eq(user_name))
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()
                .map(|row| row.map(User::from))
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn update_user(&self, id: UserId, update: &UserUpdateRecord) -> RepositoryResult<User> {
        let changes = UserChangeset {
            full_name: update.full_name.clone(),
            user_name: update.user_name.clone(),
            email: update.email.clone(),
            designation: Some(update.designation.clone()),
            role_id: Some(update.role_id.map(|r| r.value())),
            status: update.status,
            password: update.password_hash.clone(),
            parameters: update.parameters.clone(),
        };
        let at = update.at;
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let previous = sm_users::table
                    .find(id.value())
                    .select(sm_users::status)
                    .first::<bool>(tx)
                    .optional()
                    .map_err(map_diesel_error)?
                    .ok_or_else(|| user_not_found("update_user", id))?;

                let updated = diesel::update(sm_users::table.find(id.value()))
                    .set(&changes)
                    .returning(UserRow::as_returning())
                    .get_result::<UserRow>(tx)
                    .map_err(map_diesel_error)?;

                if previous != updated.status {
                    if updated.status {
                        open_status_log(tx, updated.id, at)?;
                    } else {
                        let latest_open = sm_status_logs::table
                            .filter(sm_status_logs::user_id.eq(updated.id))
                            .filter(sm_status_logs::inactivated_at.is_null())
                            .order(sm_status_logs::activated_at.desc())
                            .select(sm_status_logs::id)
                            .first::<i64>(tx)
                            .optional()
                            .map_err(map_diesel_error)?;
                        if let Some(log_id) = latest_open {
                            diesel::update(sm_status_logs::table.find(log_id))
                                .set(sm_status_logs::inactivated_at.eq(Some(at)))
                                .execute(tx)
                                .map_err(map_diesel_error)?;
                        }
                    }
                }
                Ok(User::from(updated))
            })
        })
        .await
    }

    async fn delete_user(&self, id: UserId) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let deleted = diesel::delete(sm_users::table.find(id.value()))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if deleted == 0 {
                return Err(user_not_found("delete_user", id));
            }
            Ok(())
        })
        .await
    }

    async fn set_user_status(
        &self,
        id: UserId,
        active: bool,
        at: NaiveDateTime,
    ) -> RepositoryResult<(User, Option<StatusLog>)> {
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let user = diesel::update(sm_users::table.find(id.value()))
                    .set(sm_users::status.eq(active))
                    .returning(UserRow::as_returning())
                    .get_result::<UserRow>(tx)
                    .optional()
                    .map_err(map_diesel_error)?
                    .ok_or_else(|| user_not_found("set_user_status", id))?;

                let log = if active {
                    Some(open_status_log(tx, user.id, at)?)
                } else {
                    diesel::update(
                        sm_status_logs::table
                            .filter(sm_status_logs::user_id.eq(user.id))
                            .filter(sm_status_logs::inactivated_at.is_null()),
                    )
                    .set(sm_status_logs::inactivated_at.eq(Some(at)))
                    .returning(StatusLogRow::as_returning())
                    .get_results::<StatusLogRow>(tx)
                    .map_err(map_diesel_error)?
                    .into_iter()
                    .max_by_key(|l| l.activated_at)
                };
                Ok((User::from(user), log.map(StatusLog::from)))
            })
        })
        .await
    }

    async fn user_overviews(&self, id: Option<UserId>) -> RepositoryResult<Vec<UserOverview>> {
        self.with_conn(move |conn| {
            let mut users_query = sm_users::table
                .left_join(sm_roles::table)
                .select((UserRow::as_select(), Option::<RoleRow>::as_select()))
                .order(sm_users::created_at.desc())
                .into_boxed();
            if let Some(id) = id {
                users_query = users_query.filter(sm_users::id.eq(id.value()));
            }
            let rows = users_query
                .load::<(UserRow, Option<RoleRow>)>(conn)
                .map_err(map_diesel_error)?;
            let ids: Vec<i64> = rows.iter().map(|(u, _)| u.id).collect();

            let mut latest_session: HashMap<i64, SessionRow> = HashMap::new();
            for session in sm_session_logs::table
                .filter(sm_session_logs::user_id.eq_any(ids.clone()))
                .order(sm_session_logs::login_time.asc())
                .select(SessionRow::as_select())
                .load::<SessionRow>(conn)
                .map_err(map_diesel_error)?
            {
                latest_session.insert(session.user_id, session);
            }

            let mut latest_status: HashMap<i64, StatusLogRow> = HashMap::new();
            for log in sm_status_logs::table
                .filter(sm_status_logs::user_id.eq_any(ids.clone()))
                .filter(sm_status_logs::activated_at.is_not_null())
                .order(sm_status_logs::activated_at.asc())
                .select(StatusLogRow::as_select())
                .load::<StatusLogRow>(conn)
                .map_err(map_diesel_error)?
            {
                latest_status.insert(log.user_id, log);
            }

            Ok(rows
                .into_iter()
                .map(|(user, role)| {
                    let session = latest_session.remove(&user.id).map(SessionLog::from);
                    let status = latest_status.remove(&user.id);
                    UserOverview {
                        role_name: role.as_ref().map(|r| r.name.clone()),
                        role_description: role.as_ref().and_then(|r| r.description.clone()),
                        role_permissions: role.map(|r| r.permissions),
                        login_time: session.as_ref().map(|s| s.login_time),
                        logout_time: session.as_ref().and_then(|s| s.logout_time),
                        active_hours: session.as_ref().and_then(|s| {
                            s.logout_time
                                .map(|out| (out - s.login_time).num_seconds() as f64 / 3600.0)
                        }),
                        latest_status: status.as_ref().and_then(|l| l.activated_at),
                        status_changed_at: status.and_then(|l| l.inactivated_at),
                        user: user.into(),
                    }
                })
                .collect())
        })
        .await
    }

    async fn name_and_email_taken(
        &self,
        user_name: &str,
        email: &str,
    ) -> RepositoryResult<(bool, bool)> {
        let user_name = user_name.to_string();
        let email = email.to_string();
        self.with_conn(move |conn| {
            let name_taken = diesel::select(exists(
                sm_users::table.filter(sm_users::user_name.eq(user_name)),
            ))
            .get_result::<bool>(conn)
            .map_err(map_diesel_error)?;
            let email_taken = diesel::select(exists(sm_users::table.filter(sm_users::email.eq(email))))
                .get_result::<bool>(conn)
                .map_err(map_diesel_error)?;
            Ok((name_taken, email_taken))
        })
        .await
    }

    async fn counts(&self) -> RepositoryResult<UserCounts> {
        self.with_conn(|conn| {
            let total_users = sm_users::table
                .count()
                .get_result::<i64>(conn)
                .map_err(map_diesel_error)?;
            let active_users = sm_users::table
                .filter(sm_users::status.eq(true))
                .count()
                .get_result::<i64>(conn)
                .map_err(map_diesel_error)?;
            let total_roles = sm_roles::table
                .count()
                .get_result::<i64>(conn)
                .map_err(map_diesel_error)?;
            Ok(UserCounts {
                total_users,
                total_roles,
                active_users,
                inactive_users: total_users - active_users,
            })
        })
        .await
    }

    async fn record_failed_login(
        &self,
        id: UserId,
        failed_attempts: i32,
        on_hold_until: Option<NaiveDateTime>,
    ) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let target = sm_users::table.find(id.value());
            let updated = match on_hold_until {
                Some(until) => diesel::update(target)
                    .set((
                        sm_users::failed_attempts.eq(failed_attempts),
                        sm_users::on_hold_time.eq(Some(until)),
                    ))
                    .execute(conn),
                None => diesel::update(target)
                    .set(sm_users::failed_attempts.eq(failed_attempts))
                    .execute(conn),
            }
            .map_err(map_diesel_error)?;
            if updated == 0 {
                return Err(user_not_found("record_failed_login", id));
            }
            Ok(())
        })
        .await
    }

    async fn clear_failed_logins(&self, id: UserId) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            diesel::update(sm_users::table.find(id.value()))
                .set((
                    sm_users::failed_attempts.eq(0),
                    sm_users::on_hold_time.eq(None::<NaiveDateTime>),
                ))
                .execute(conn)
                .map(|_| ())
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn set_password_hash(
        &self,
        user_name: &str,
        password_hash: &str,
    ) -> RepositoryResult<bool> {
        let user_name = user_name.to_string();
        let password_hash = password_hash.to_string();
        self.with_conn(move |conn| {
            diesel::update(sm_users::table.filter(sm_users::user_name.eq(user_name)))
                .set(sm_users::password.eq(password_hash))
                .execute(conn)
                .map(|n| n > 0)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn open_session(&self, user_id: UserId, at: NaiveDateTime) -> RepositoryResult<SessionId> {
        self.with_conn(move |conn| {
            diesel::insert_into(sm_session_logs::table)
                .values((
                    sm_session_logs::user_id.eq(user_id.value()),
                    sm_session_logs::login_time.eq(at),
                ))
                .returning(sm_session_logs::id)
                .get_result::<i64>(conn)
                .map(SessionId::new)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn close_session(&self, id: SessionId, at: NaiveDateTime) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let updated = diesel::update(sm_session_logs::table.find(id.value()))
                .set(sm_session_logs::logout_time.eq(Some(at)))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if updated == 0 {
                return Err(RepositoryError::not_found_with_context(
                    "Session not found",
                    ErrorContext::new("close_session").with_entity("session").with_entity_id(id),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn active_sessions(&self) -> RepositoryResult<Vec<ActiveSession>> {
        self.with_conn(|conn| {
            Ok(sm_session_logs::table
                .inner_join(sm_users::table)
                .filter(sm_session_logs::logout_time.is_null())
                .order(sm_session_logs::login_time.desc())
                .select((
                    sm_session_logs::id,
                    sm_session_logs::user_id,
                    sm_session_logs::login_time,
                    sm_users::user_name,
                    sm_users::full_name,
                ))
                .load::<(i64, i64, NaiveDateTime, String, String)>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(|(session_id, user_id, login_time, user_name, full_name)| ActiveSession {
                    session_id: SessionId::new(session_id),
                    user_id: UserId::new(user_id),
                    login_time,
                    user_name,
                    full_name,
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl LogRepository for PostgresRepository {
    async fn insert_log(&self, entry: &NewAppLog, at: NaiveDateTime) -> RepositoryResult<LogId> {
        let row = NewLogRow {
            message: entry.message.clone(),
            location: entry.location.clone(),
            log_type: entry.log_type.clone(),
            log_time: at,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(sm_logs::table)
                .values(&row)
                .returning(sm_logs::id)
                .get_result::<i64>(conn)
                .map(LogId::new)
                .map_err(map_diesel_error)
        })
        .await
    }
}
