//! Application state for the HTTP server.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::config::AppConfig;
use crate::db::repository::FullRepository;
use crate::services::{BcryptHasher, LogMailer, LoginPolicy, Mailer, PasswordHasher};

/// Clock used for session, status and log timestamps.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository instance for database operations
    pub repository: Arc<dyn FullRepository>,
    pub mailer: Arc<dyn Mailer>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub login_policy: LoginPolicy,
    /// Buckets returned by `fetchDataHealthChart`.
    pub chart_buckets: usize,
    clock: Clock,
}

impl AppState {
    /// State with the mailer, hasher and policies described by `config`.
    pub fn new(repository: Arc<dyn FullRepository>, config: &AppConfig) -> Self {
        Self {
            repository,
            mailer: Arc::new(LogMailer::new(config.mail.sender())),
            hasher: Arc::new(BcryptHasher::new(config.auth.bcrypt_cost)),
            login_policy: config.auth.login_policy(),
            chart_buckets: config.health.chart_buckets,
            clock: Arc::new(|| chrono::Local::now().naive_local()),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub fn repo(&self) -> &dyn FullRepository {
        self.repository.as_ref()
    }
}
