//! HTTP handlers for the REST API.
//!
//! Each handler parses its parameters, delegates to the service layer and
//! converts failures into [`AppError`]. Server-side failures are also written
//! to the application log table.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};

use super::dto::{
    required, AveragesQuery, CheckRequest, DataEnvelope, DayQuery, HealthResponse, LiveQuery,
    LogInserted, LogoutRequest, MailResponse, MessageResponse, RangeQuery, ResetPasswordRequest,
    StatusRequest, SuccessResponse,
};
use super::error::AppError;
use super::extract::{ApiJson, ApiPath};
use super::state::AppState;
use crate::models::{
    HealthChartPoint, HealthReport, MergedRecord, NewAppLog, NewUser, Role, RoleId, RoleInput,
    RoleWithCount, User, UserCounts, UserId, UserOverview, UserUpdate, UserWithRole,
};
use crate::services::averages::{self, AverageRequest, CurrentPanel, TideObservations, WindPanel};
use crate::services::live::{self, LiveData};
use crate::services::users::{
    self, ActiveSessions, Credentials, LoginOutcome, LoginSuccess, NameCheck, RecoveryCheck,
    RecoveryRequest, StatusChange,
};
use crate::services::{health, logs, merge, snapshot, MailMessage};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Trace a failed request and persist server-side failures.
async fn finish<T>(
    state: &AppState,
    location: &'static str,
    result: Result<T, AppError>,
) -> HandlerResult<T> {
    match result {
        Ok(value) => Ok(Json(value)),
        Err(err) => {
            if err.is_server_error() {
                tracing::error!(location, error = %err, "request failed");
                logs::record_error(state.repo(), location, &err.to_string(), state.now()).await;
            } else {
                tracing::debug!(location, error = %err, "request rejected");
            }
            Err(err)
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let database = match state.repo().health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    }))
}

// =============================================================================
// Dashboard
// =============================================================================

/// GET /api/get_dash_data?from&to&type
pub async fn get_dash_data(
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
) -> HandlerResult<DataEnvelope<LiveData>> {
    tracing::debug!(?query, "get_dash_data");
    let result = async {
        let (variant, range) = query.resolve()?;
        let data = live::resolve_live(state.repo(), variant, range).await?;
        Ok::<_, AppError>(DataEnvelope { data })
    }
    .await;
    finish(&state, "get_dash_data", result).await
}

/// GET /api/get_dash_data2?date=DD-MM-YYYY&type
pub async fn get_dash_data2(
    State(state): State<AppState>,
    Query(query): Query<DayQuery>,
) -> HandlerResult<DataEnvelope<LiveData>> {
    tracing::debug!(?query, "get_dash_data2");
    let result = async {
        let (variant, date) = query.resolve()?;
        let data = live::resolve_day(state.repo(), variant, date).await?;
        Ok::<_, AppError>(DataEnvelope { data })
    }
    .await;
    finish(&state, "get_dash_data2", result).await
}

// =============================================================================
// Health and merged data
// =============================================================================

/// GET /api/fetchDataHealthReport?fromDate&toDate
pub async fn fetch_data_health_report(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<HealthReport> {
    tracing::debug!(?query, "fetchDataHealthReport");
    let result = async {
        let report = health::health_report(state.repo(), query.variant()?, query.range()?).await?;
        Ok::<_, AppError>(report)
    }
    .await;
    finish(&state, "fetchDataHealthReport", result).await
}

/// GET /api/fetchDataHealthChart?fromDate&toDate
pub async fn fetch_data_health_chart(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<Vec<HealthChartPoint>> {
    tracing::debug!(?query, "fetchDataHealthChart");
    let result = async {
        let chart = health::health_chart(
            state.repo(),
            query.variant()?,
            query.range()?,
            state.chart_buckets,
        )
        .await?;
        Ok::<_, AppError>(chart)
    }
    .await;
    finish(&state, "fetchDataHealthChart", result).await
}

/// GET /api/fetchAverageData?fromDate&toDate
pub async fn fetch_average_data(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<Vec<Map<String, Value>>> {
    tracing::debug!(?query, "fetchAverageData");
    let result = async {
        let rows = averages::six_hour_averages(state.repo(), query.variant()?, query.range()?).await?;
        Ok::<_, AppError>(rows)
    }
    .await;
    finish(&state, "fetchAverageData", result).await
}

/// GET /api/fetchAllData?fromDate&toDate
pub async fn fetch_all_data(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<Vec<MergedRecord>> {
    tracing::debug!(?query, "fetchAllData");
    let result = async {
        let rows = merge::all_data(state.repo(), query.variant()?, query.range()?).await?;
        Ok::<_, AppError>(rows)
    }
    .await;
    finish(&state, "fetchAllData", result).await
}

/// GET /api/fetchReportData?fromDate&toDate
pub async fn fetch_report_data(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<Vec<MergedRecord>> {
    tracing::debug!(?query, "fetchReportData");
    let result = async {
        let rows = snapshot::report_data(state.repo(), query.variant()?, query.range()?).await?;
        Ok::<_, AppError>(rows)
    }
    .await;
    finish(&state, "fetchReportData", result).await
}

/// GET /api/fetchTideObs?fromDate&toDate[&station_id]
pub async fn fetch_tide_obs(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<TideObservations> {
    tracing::debug!(?query, "fetchTideObs");
    let result = async {
        let data =
            averages::tide_observations(state.repo(), query.range()?, query.station()).await?;
        Ok::<_, AppError>(data)
    }
    .await;
    finish(&state, "fetchTideObs", result).await
}

/// GET /api/fetchWindData
pub async fn fetch_wind_data(State(state): State<AppState>) -> HandlerResult<WindPanel> {
    let result = averages::recent_wind(state.repo(), state.now())
        .await
        .map_err(AppError::from);
    finish(&state, "fetchWindData", result).await
}

/// GET /api/fetchCurrentData
pub async fn fetch_current_data(State(state): State<AppState>) -> HandlerResult<CurrentPanel> {
    let result = averages::recent_current(state.repo(), state.now())
        .await
        .map_err(AppError::from);
    finish(&state, "fetchCurrentData", result).await
}

/// GET /api/averages?date&table&parameters=a,b,c
///
/// The table and every parameter are checked against the allow-lists before
/// the repository is touched.
pub async fn get_averages(
    State(state): State<AppState>,
    Query(query): Query<AveragesQuery>,
) -> HandlerResult<DataEnvelope<Vec<Map<String, Value>>>> {
    tracing::debug!(?query, "averages");
    let result = async {
        let request = AverageRequest::parse(
            required(&query.date, "date")?,
            required(&query.table, "table")?,
            required(&query.parameters, "parameters")?,
        )?;
        let data = averages::day_averages(state.repo(), &request).await?;
        Ok::<_, AppError>(DataEnvelope { data })
    }
    .await;
    finish(&state, "averages", result).await
}

// =============================================================================
// Logs and mail
// =============================================================================

/// POST /api/insertLogs
pub async fn insert_logs(
    State(state): State<AppState>,
    ApiJson(entry): ApiJson<NewAppLog>,
) -> HandlerResult<LogInserted> {
    let result = logs::insert_log(state.repo(), &entry, state.now())
        .await
        .map(|id| LogInserted {
            message: "Log inserted successfully",
            id,
        })
        .map_err(AppError::from);
    finish(&state, "insertLogs", result).await
}

/// POST /api/sendmail
pub async fn send_mail(
    State(state): State<AppState>,
    ApiJson(message): ApiJson<MailMessage>,
) -> Response {
    match state.mailer.send(&message).await {
        Ok(()) => Json(MailResponse {
            success: true,
            message: "Email sent successfully!".to_string(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(to = %message.to, error = %e, "sendmail failed");
            logs::record_error(state.repo(), "sendmail", &e.to_string(), state.now()).await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MailResponse {
                    success: false,
                    message: "Failed to send email".to_string(),
                }),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Roles
// =============================================================================

/// POST /api/addRole
pub async fn add_role(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RoleInput>,
) -> HandlerResult<Role> {
    let result = users::add_role(state.repo(), &input).await.map_err(AppError::from);
    finish(&state, "addRole", result).await
}

/// GET /api/fetchRole
pub async fn fetch_role(State(state): State<AppState>) -> HandlerResult<Vec<RoleWithCount>> {
    let result = state
        .repo()
        .list_roles_with_counts()
        .await
        .map_err(AppError::from);
    finish(&state, "fetchRole", result).await
}

/// PUT /api/updateRole/{id}
pub async fn update_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RoleId>,
    ApiJson(input): ApiJson<RoleInput>,
) -> HandlerResult<Role> {
    let result = users::update_role(state.repo(), id, &input)
        .await
        .map_err(AppError::from);
    finish(&state, "updateRole", result).await
}

/// DELETE /api/deleteRole/{id}
pub async fn delete_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RoleId>,
) -> HandlerResult<MessageResponse> {
    let result = state
        .repo()
        .delete_role(id)
        .await
        .map(|()| MessageResponse::new("Role deleted successfully"))
        .map_err(AppError::from);
    finish(&state, "deleteRole", result).await
}

/// GET /api/getroles
pub async fn get_roles(State(state): State<AppState>) -> HandlerResult<Vec<Role>> {
    let result = state.repo().list_roles().await.map_err(AppError::from);
    finish(&state, "getroles", result).await
}

// =============================================================================
// Users
// =============================================================================

/// POST /api/users
pub async fn add_user(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewUser>,
) -> HandlerResult<User> {
    let result = users::add_user(state.repo(), &state.hasher, input, state.now())
        .await
        .map_err(AppError::from);
    finish(&state, "addUser", result).await
}

/// GET /api/users
pub async fn fetch_users(State(state): State<AppState>) -> HandlerResult<Vec<UserWithRole>> {
    let result = state.repo().list_users().await.map_err(AppError::from);
    finish(&state, "fetchUsers", result).await
}

/// GET /api/users/all
pub async fn get_all_users(State(state): State<AppState>) -> HandlerResult<Vec<UserOverview>> {
    let result = state.repo().user_overviews(None).await.map_err(AppError::from);
    finish(&state, "getAllUsers", result).await
}

/// GET /api/users/{id}
pub async fn get_user_by_id(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> HandlerResult<UserWithRole> {
    let result = match state.repo().get_user(id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(AppError::NotFound("User not found".to_string())),
        Err(e) => Err(e.into()),
    };
    finish(&state, "getUserById", result).await
}

/// GET /api/users/{id}/details
pub async fn get_user_details(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> HandlerResult<UserOverview> {
    let result = match state.repo().user_overviews(Some(id)).await {
        Ok(overviews) => overviews
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("User not found".to_string())),
        Err(e) => Err(e.into()),
    };
    finish(&state, "getUserDetails", result).await
}

/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(input): ApiJson<UserUpdate>,
) -> HandlerResult<User> {
    let result = users::update_user(state.repo(), &state.hasher, id, input, state.now())
        .await
        .map_err(AppError::from);
    finish(&state, "updateUser", result).await
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> HandlerResult<MessageResponse> {
    let result = state
        .repo()
        .delete_user(id)
        .await
        .map(|()| MessageResponse::new("User deleted successfully"))
        .map_err(AppError::from);
    finish(&state, "deleteUser", result).await
}

/// PUT /api/users/{id}/status
pub async fn update_user_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(request): ApiJson<StatusRequest>,
) -> HandlerResult<StatusChange> {
    let result = users::update_status(state.repo(), id, request.status, state.now())
        .await
        .map_err(AppError::from);
    finish(&state, "updateUserStatus", result).await
}

/// POST /api/check
pub async fn check_username(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CheckRequest>,
) -> HandlerResult<NameCheck> {
    let result = users::check_username(state.repo(), &request.user_name, &request.email)
        .await
        .map_err(AppError::from);
    finish(&state, "checkUsername", result).await
}

/// GET /api/counts
pub async fn get_counts(State(state): State<AppState>) -> HandlerResult<UserCounts> {
    let result = state.repo().counts().await.map_err(AppError::from);
    finish(&state, "getCounts", result).await
}

/// GET /api/currect_login
pub async fn current_logins(State(state): State<AppState>) -> HandlerResult<ActiveSessions> {
    let result = users::active_sessions(state.repo()).await.map_err(AppError::from);
    finish(&state, "currentLogin", result).await
}

// =============================================================================
// Login and password recovery
// =============================================================================

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> HandlerResult<LoginSuccess> {
    let result = match users::login(
        state.repo(),
        &state.hasher,
        state.login_policy,
        &credentials,
        state.now(),
    )
    .await
    {
        Ok(LoginOutcome::Success(success)) => Ok(success),
        Ok(outcome @ (LoginOutcome::UnknownUser | LoginOutcome::WrongPassword)) => {
            Err(AppError::Unauthorized(outcome.message()))
        }
        Ok(outcome) => Err(AppError::Forbidden(outcome.message())),
        Err(e) => Err(e.into()),
    };
    finish(&state, "login", result).await
}

/// POST /api/logout
pub async fn logout(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LogoutRequest>,
) -> HandlerResult<MessageResponse> {
    let result = async {
        let session_id = request
            .session_id
            .ok_or_else(|| AppError::BadRequest("sessionId is required".to_string()))?;
        users::logout(state.repo(), session_id, state.now()).await?;
        Ok::<_, AppError>(MessageResponse::new("Logout successful"))
    }
    .await;
    finish(&state, "logout", result).await
}

/// POST /api/forgotrequest
pub async fn forgot_request(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RecoveryRequest>,
) -> HandlerResult<RecoveryCheck> {
    let result = users::forgot_request(state.repo(), &request)
        .await
        .map_err(AppError::from);
    finish(&state, "forgotRequest", result).await
}

/// POST /api/verifyUser
pub async fn verify_user(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RecoveryRequest>,
) -> HandlerResult<RecoveryCheck> {
    let result = users::verify_user(state.repo(), &state.hasher, &request)
        .await
        .map_err(AppError::from);
    finish(&state, "verifyUser", result).await
}

/// POST /api/resetPassword
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> HandlerResult<SuccessResponse> {
    let result = users::reset_password(
        state.repo(),
        &state.hasher,
        &request.user_name,
        &request.new_password,
    )
    .await
    .map(|()| SuccessResponse { success: true })
    .map_err(AppError::from);
    finish(&state, "resetPassword", result).await
}
