//! Data Transfer Objects for the HTTP API.
//!
//! Query strings are taken as optional strings and checked by the handlers so
//! a missing parameter produces the API's own `{ error }` body rather than
//! axum's plain-text rejection.

use serde::{Deserialize, Serialize};

use crate::db::repository::{RepositoryError, RepositoryResult};
use crate::models::{parse_dmy_date, LogId, SessionId, TimeRange, Variant};

/// Value of a required query parameter.
pub fn required<'a>(value: &'a Option<String>, name: &str) -> RepositoryResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RepositoryError::validation(format!("{} is required", name))),
    }
}

/// `obs` when the parameter is absent.
fn variant_or_default(value: &Option<String>) -> RepositoryResult<Variant> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => v.parse(),
        _ => Ok(Variant::default()),
    }
}

/// `GET /get_dash_data?from&to&type`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub variant: Option<String>,
}

impl LiveQuery {
    pub fn resolve(&self) -> RepositoryResult<(Variant, TimeRange)> {
        let variant = required(&self.variant, "type")?.parse()?;
        let range = TimeRange::parse(required(&self.from, "from")?, required(&self.to, "to")?)?;
        Ok((variant, range))
    }
}

/// `GET /get_dash_data2?date=DD-MM-YYYY&type`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub variant: Option<String>,
}

impl DayQuery {
    pub fn resolve(&self) -> RepositoryResult<(Variant, chrono::NaiveDate)> {
        let variant = required(&self.variant, "type")?.parse()?;
        let date = parse_dmy_date(required(&self.date, "date")?)?;
        Ok((variant, date))
    }
}

/// `?fromDate&toDate[&type][&station_id]`, shared by the merged, health and
/// tide endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeQuery {
    #[serde(rename = "fromDate")]
    pub from_date: Option<String>,
    #[serde(rename = "toDate")]
    pub to_date: Option<String>,
    #[serde(rename = "type")]
    pub variant: Option<String>,
    pub station_id: Option<String>,
}

impl RangeQuery {
    pub fn range(&self) -> RepositoryResult<TimeRange> {
        TimeRange::parse(
            required(&self.from_date, "fromDate")?,
            required(&self.to_date, "toDate")?,
        )
    }

    pub fn variant(&self) -> RepositoryResult<Variant> {
        variant_or_default(&self.variant)
    }

    pub fn station(&self) -> Option<&str> {
        self.station_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// `GET /averages?date&table&parameters=a,b,c`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AveragesQuery {
    pub date: Option<String>,
    pub table: Option<String>,
    pub parameters: Option<String>,
}

/// Rows wrapped as `{ data: [...] }`.
#[derive(Debug, Clone, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Plain `{ message }` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogInserted {
    pub message: &'static str,
    pub id: LogId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusRequest {
    pub status: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutRequest {
    #[serde(rename = "sessionId")]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub user_name: String,
    #[serde(rename = "newPassword", default)]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}
