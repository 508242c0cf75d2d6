//! Repository trait definitions for database operations.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`observation`]: Sensor stream reads, merges and aggregations
//! - [`users`]: Roles, users, sessions and application logs
//!
//! # Convenience Trait Bound
//!
//! For code that needs every repository capability, use the [`FullRepository`] trait bound:
//!
//! ```ignore
//! async fn my_service(repo: &dyn FullRepository) -> RepositoryResult<()> {
//!     let merged = repo.fetch_merged(Variant::Observed, range, AlignmentKey::default()).await?;
//!     repo.insert_log(&entry, now).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod observation;
pub mod users;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use observation::ObservationRepository;
pub use users::{LogRepository, UserRepository};

/// Composite trait bound for a complete repository implementation.
///
/// Automatically implemented for any type that implements all repository
/// traits.
pub trait FullRepository: ObservationRepository + UserRepository + LogRepository {}

impl<T> FullRepository for T where T: ObservationRepository + UserRepository + LogRepository {}
