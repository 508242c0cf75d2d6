//! Service layer for business logic and orchestration.
//!
//! Services sit between the HTTP handlers and the repository traits: they
//! validate inputs, fan out concurrent repository reads and shape the
//! results. The pure functions (bucketing, health ratios, merging, snapshot
//! ranking, averaging) are shared with the in-memory repository.

pub mod averages;
pub mod buckets;
pub mod health;
pub mod live;
pub mod logs;
pub mod mail;
pub mod merge;
pub mod snapshot;
pub mod users;

pub use buckets::TimeBuckets;
pub use health::{health_chart, health_report};
pub use live::{resolve_day, resolve_live, LiveData, StreamSummary};
pub use mail::{LogMailer, MailError, MailMessage, Mailer, Sender};
pub use merge::merge_streams;
pub use snapshot::four_times_daily;
pub use users::{BcryptHasher, LoginOutcome, LoginPolicy, PasswordHasher};
