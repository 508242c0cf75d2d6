//! Application log table writes.

use chrono::NaiveDateTime;

use crate::db::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{LogId, NewAppLog};

/// Insert a dashboard-submitted log entry. A blank message is rejected.
pub async fn insert_log(
    repo: &dyn FullRepository,
    entry: &NewAppLog,
    now: NaiveDateTime,
) -> RepositoryResult<LogId> {
    if entry.message.trim().is_empty() {
        return Err(RepositoryError::validation_with_context(
            "Message is required",
            ErrorContext::new("insert_log"),
        ));
    }
    repo.insert_log(entry, now).await
}

/// Write a handler failure to the log table.
///
/// Never fails: a failed write is only traced.
pub async fn record_error(
    repo: &dyn FullRepository,
    location: &str,
    message: &str,
    now: NaiveDateTime,
) {
    let entry = NewAppLog {
        message: message.to_string(),
        location: Some(location.to_string()),
        log_type: Some("error".to_string()),
    };
    if let Err(e) = repo.insert_log(&entry, now).await {
        tracing::warn!(location, error = %e, "could not persist error log");
    }
}
