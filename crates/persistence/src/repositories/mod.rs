//! Repository implementations for database operations.

pub mod job;
pub mod report;
pub mod tenant;

pub use job::PgJobRepository;
pub use report::PgReportRepository;
pub use tenant::PgTenantRepository;

use domain::error::RepositoryError;

/// Postgres SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Map a unique-constraint failure to [`RepositoryError::UniqueViolation`].
pub(crate) fn map_unique_violation(err: sqlx::Error) -> RepositoryError {
    match err.as_database_error() {
        Some(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            RepositoryError::UniqueViolation(db.constraint().unwrap_or("unique").to_string())
        }
        _ => RepositoryError::Database(err),
    }
}
