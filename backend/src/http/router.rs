//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing,
//! request timeout) and creates the axum router ready for serving.

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;
use crate::config::ServerSettings;

/// Requests running past `request_timeout_secs` are answered with 408.
pub fn timeout_layer(server: &ServerSettings) -> TimeoutLayer {
    TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(server.request_timeout_secs),
    )
}

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState, server: &ServerSettings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Dashboard and reports
        .route("/get_dash_data", get(handlers::get_dash_data))
        .route("/get_dash_data2", get(handlers::get_dash_data2))
        .route("/fetchDataHealthReport", get(handlers::fetch_data_health_report))
        .route("/fetchDataHealthChart", get(handlers::fetch_data_health_chart))
        .route("/fetchAverageData", get(handlers::fetch_average_data))
        .route("/fetchAllData", get(handlers::fetch_all_data))
        .route("/fetchReportData", get(handlers::fetch_report_data))
        .route("/fetchTideObs", get(handlers::fetch_tide_obs))
        .route("/fetchWindData", get(handlers::fetch_wind_data))
        .route("/fetchCurrentData", get(handlers::fetch_current_data))
        .route("/averages", get(handlers::get_averages))
        // Notifications and logs
        .route("/sendmail", post(handlers::send_mail))
        .route("/insertLogs", post(handlers::insert_logs))
        // Roles
        .route("/addRole", post(handlers::add_role))
        .route("/fetchRole", get(handlers::fetch_role))
        .route("/updateRole/{id}", put(handlers::update_role))
        .route("/deleteRole/{id}", delete(handlers::delete_role))
        .route("/getroles", get(handlers::get_roles))
        // Users
        .route("/users", post(handlers::add_user).get(handlers::fetch_users))
        .route("/users/all", get(handlers::get_all_users))
        .route(
            "/users/{id}",
            get(handlers::get_user_by_id)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route("/users/{id}/details", get(handlers::get_user_details))
        .route("/users/{id}/status", put(handlers::update_user_status))
        .route("/check", post(handlers::check_username))
        .route("/counts", get(handlers::get_counts))
        .route("/currect_login", get(handlers::current_logins))
        // Login and password recovery
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/verifyUser", post(handlers::verify_user))
        .route("/resetPassword", post(handlers::reset_password))
        .route("/forgotrequest", post(handlers::forgot_request));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(timeout_layer(server))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::repositories::LocalRepository;
    use std::sync::Arc;

    #[test]
    fn test_router_creation() {
        let config = AppConfig::default();
        let repo = Arc::new(LocalRepository::new()) as Arc<dyn crate::db::repository::FullRepository>;
        let state = AppState::new(repo, &config);
        let _router = create_router(state, &config.server);
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let server = ServerSettings {
            request_timeout_secs: 1,
            ..ServerSettings::default()
        };
        let app: Router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    "done"
                }),
            )
            .layer(timeout_layer(&server));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
