//! Router-level tests driven through `tower::ServiceExt::oneshot`.

mod support;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use marine_monitor::config::AppConfig;
use marine_monitor::db::repositories::LocalRepository;
use marine_monitor::db::repository::FullRepository;
use marine_monitor::http::{create_router, AppState};
use marine_monitor::models::{NewAppLog, Stream};
use marine_monitor::services::BcryptHasher;

use support::{jan, seed};

fn app_with(repo: Arc<LocalRepository>) -> Router {
    let config = AppConfig::default();
    let state = AppState::new(repo as Arc<dyn FullRepository>, &config)
        .with_hasher(Arc::new(BcryptHasher::new(4)))
        .with_clock(Arc::new(|| jan(15, 12, 0)));
    create_router(state, &config.server)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn post_raw(app: &Router, uri: &str, body: &'static str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = app_with(Arc::new(LocalRepository::new()));
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_averages_rejects_unknown_table() {
    let app = app_with(Arc::new(LocalRepository::new()));
    let (status, body) = get(
        &app,
        "/api/averages?date=2024-01-01&table=sm_users&parameters=water_level",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid table name");
}

#[tokio::test]
async fn test_averages_rejects_unknown_parameter() {
    let app = app_with(Arc::new(LocalRepository::new()));
    let (status, body) = get(
        &app,
        "/api/averages?date=2024-01-01&table=sm_tide_obs&parameters=water_level,password",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_averages_returns_data_envelope() {
    let repo = Arc::new(LocalRepository::new());
    seed(&repo, Stream::Tide, jan(1, 2, 0), "water_level", 2.0);
    let app = app_with(repo);
    let (status, body) = get(
        &app,
        "/api/averages?date=2024-01-01&table=sm_tide_obs&parameters=water_level",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["hour"], "2024-01-01T02:00:00");
    assert_eq!(body["data"][0]["avg_water_level"], json!(2.0));
}

#[tokio::test]
async fn test_dash_data_requires_type() {
    let app = app_with(Arc::new(LocalRepository::new()));
    let (status, body) = get(&app, "/api/get_dash_data?from=2024-01-01&to=2024-01-02").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "type is required");

    let (status, _) = get(&app, "/api/get_dash_data?from=2024-01-01&to=2024-01-02&type=xyz").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dash_data_summaries_are_camel_case() {
    let repo = Arc::new(LocalRepository::new());
    seed(&repo, Stream::Tide, jan(1, 0, 0), "water_level", 1.1);
    let app = app_with(repo);
    let (status, body) = get(
        &app,
        "/api/get_dash_data?from=2024-01-05T00:00:00&to=2024-01-06T00:00:00&type=obs",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tide = &body["data"]["summaries"]["tide"];
    assert_eq!(tide["isFallback"], true);
    assert_eq!(tide["sampleValue"], json!(1.1));
    assert_eq!(tide["firstTimestamp"], "2024-01-01T00:00:00");
    assert!(body["data"]["summaries"]["wind"].is_null());
}

#[tokio::test]
async fn test_health_chart_has_configured_bucket_count() {
    let repo = Arc::new(LocalRepository::new());
    seed(&repo, Stream::Tide, jan(1, 0, 0), "water_level", 1.2);
    let app = app_with(repo);
    let (status, body) = get(
        &app,
        "/api/fetchDataHealthChart?fromDate=2024-01-01T00:00:00&toDate=2024-01-01T06:00:00",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let points = body.as_array().unwrap();
    assert_eq!(points.len(), 15);
    assert_eq!(points[0]["water_level_health"], json!(1.0));
    assert_eq!(points[0]["total_records"], 1);
    assert_eq!(points[1]["water_level_health"], json!(0.0));
}

#[tokio::test]
async fn test_inverted_range_is_client_error() {
    let app = app_with(Arc::new(LocalRepository::new()));
    let (status, _) = get(
        &app,
        "/api/fetchAllData?fromDate=2024-01-02&toDate=2024-01-01",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_store_failure_is_server_error_with_message() {
    let repo = Arc::new(LocalRepository::new());
    repo.set_healthy(false);
    let app = app_with(repo);
    let (status, body) = get(
        &app,
        "/api/fetchAllData?fromDate=2024-01-01&toDate=2024-01-02",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_server_errors_are_logged() {
    let repo = Arc::new(LocalRepository::new());
    let app = app_with(Arc::clone(&repo));

    let (status, _) = post(&app, "/api/insertLogs", json!({ "message": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(repo.log_entries().is_empty());

    let (status, body) = post(
        &app,
        "/api/insertLogs",
        json!({ "message": "gauge offline", "location": "dashboard", "type": "warn" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Log inserted successfully");
    let logs = repo.log_entries();
    assert_eq!(logs.len(), 1);
    assert_eq!(
        logs[0].entry,
        NewAppLog {
            message: "gauge offline".to_string(),
            location: Some("dashboard".to_string()),
            log_type: Some("warn".to_string()),
        }
    );
    assert_eq!(logs[0].log_time, jan(15, 12, 0));
}

#[tokio::test]
async fn test_malformed_input_gets_json_error_body() {
    let repo = Arc::new(LocalRepository::new());
    let app = app_with(repo.clone());

    let (status, body) = post(&app, "/api/insertLogs", json!({ "message": 5 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(repo.log_entries().is_empty());

    let (status, body) = post_raw(&app, "/api/login", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = get(&app, "/api/users/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("abc"));
}

#[tokio::test]
async fn test_sendmail_reports_failure() {
    let app = app_with(Arc::new(LocalRepository::new()));
    let (status, body) = post(
        &app,
        "/api/sendmail",
        json!({ "to": "ops@example.org", "subject": "Tide", "text": "High water" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = post(&app, "/api/sendmail", json!({ "to": "", "subject": "x" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_user_lifecycle_and_login_lockout() {
    let repo = Arc::new(LocalRepository::new());
    let app = app_with(Arc::clone(&repo));

    let (status, role) = post(
        &app,
        "/api/addRole",
        json!({ "name": "operator", "permissions": "{\"dashboard\": true}" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, user) = post(
        &app,
        "/api/users",
        json!({
            "full_name": "Ana Reyes",
            "user_name": "ana",
            "email": "ana@example.org",
            "role_id": role["id"],
            "status": true,
            "password": "s3cret"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(user.get("password_hash").is_none());

    let (status, check) = post(
        &app,
        "/api/check",
        json!({ "user_name": "ana", "email": "nobody@example.org" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check, json!({ "usernameExists": true, "emailExists": false }));

    let (status, login) = post(
        &app,
        "/api/login",
        json!({ "user_name": "ana", "password": "s3cret" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["user"]["permissions"], json!({ "dashboard": true }));
    assert_eq!(login["user"]["role"], "operator");

    let (_, sessions) = get(&app, "/api/currect_login").await;
    assert_eq!(sessions["count"], 1);

    let (status, _) = post(&app, "/api/logout", json!({ "sessionId": login["sessionId"] })).await;
    assert_eq!(status, StatusCode::OK);
    let (_, sessions) = get(&app, "/api/currect_login").await;
    assert_eq!(sessions["count"], 0);

    let wrong = json!({ "user_name": "ana", "password": "nope" });
    let (status, body) = post(&app, "/api/login", wrong.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid password");
    let (status, _) = post(&app, "/api/login", wrong.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = post(&app, "/api/login", wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Correct password while on hold.
    let (status, body) = post(
        &app,
        "/api/login",
        json!({ "user_name": "ana", "password": "s3cret" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap().contains("60 minutes"));

    let (status, counts) = get(&app, "/api/counts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts["total_users"], 1);
    assert_eq!(counts["active_users"], 1);
}

#[tokio::test]
async fn test_unknown_user_lookups() {
    let app = app_with(Arc::new(LocalRepository::new()));

    let (status, body) = get(&app, "/api/users/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, _) = get(&app, "/api/users/999/details").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post(
        &app,
        "/api/login",
        json!({ "user_name": "ghost", "password": "x" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User not found");

    let (status, body) = post(
        &app,
        "/api/forgotrequest",
        json!({ "user_name": "ghost", "email_id": "g@example.org" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": false, "reason": "username" }));
}
