//! Domain error types.

use thiserror::Error;

/// Errors raised by repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Errors raised while computing schedules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCronExpression { expr: String, reason: String },
}

/// Errors raised by the render dispatcher and its backends.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Renderer returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Renderer request failed: {0}")]
    Transport(String),

    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Renderer is not available")]
    Unavailable,

    #[error("Renderer is over capacity")]
    OverCapacity,
}

/// Errors raised by delivery collaborators (email, FTP, object storage).
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("FTP delivery failed: {0}")]
    Ftp(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Failed to read artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delivery channel not configured: {0}")]
    NotConfigured(&'static str),
}

/// Errors raised by the tenant-management and dashboard collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Request to {service} timed out")]
    Timeout { service: &'static str },

    #[error("{service} returned an error: {message}")]
    Failed {
        service: &'static str,
        message: String,
    },

    #[error("{service} has no record for {what}")]
    Missing { service: &'static str, what: String },
}

/// Error taxonomy of the report scheduling core.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A report with this name already exists for the dashboard")]
    NameAlreadyExists,

    #[error("The dashboard of an existing report cannot be changed")]
    EditNotAllowed,

    #[error("Report quota exceeded ({count}/{limit})")]
    QuotaExceeded { limit: i64, count: i64 },

    #[error("Tenant quota configuration missing: {0}")]
    QuotaConfigMissing(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCronExpression(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Rendering service unavailable")]
    RenderUnavailable,

    #[error("Rendering service over capacity, retry later")]
    RenderOverCapacity,

    #[error("Rendering timed out")]
    RenderTimeout,

    #[error("Rendering failed: {0}")]
    RenderFailed(String),

    #[error("Report artifact was not stored")]
    NotInStorage,

    #[error("Report artifact is no longer available")]
    NotAvailable,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for ReportError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UniqueViolation(_) => ReportError::NameAlreadyExists,
            other => ReportError::Internal(other.to_string()),
        }
    }
}

impl From<ScheduleError> for ReportError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidTimezone(tz) => ReportError::InvalidTimezone(tz),
            ScheduleError::InvalidCronExpression { expr, reason } => {
                ReportError::InvalidCronExpression(format!("{}: {}", expr, reason))
            }
        }
    }
}

impl From<RenderError> for ReportError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Timeout(_) => ReportError::RenderTimeout,
            RenderError::Unavailable => ReportError::RenderUnavailable,
            RenderError::OverCapacity => ReportError::RenderOverCapacity,
            other => ReportError::RenderFailed(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ReportError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ReportError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unique_violation_maps_to_name_exists() {
        let err: ReportError = RepositoryError::UniqueViolation("report_data".into()).into();
        assert!(matches!(err, ReportError::NameAlreadyExists));
    }

    #[test]
    fn test_database_error_is_internal() {
        let err: ReportError = RepositoryError::Database(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, ReportError::Internal(_)));
    }

    #[test]
    fn test_render_errors_map_to_taxonomy() {
        assert!(matches!(
            ReportError::from(RenderError::Timeout(Duration::from_secs(1))),
            ReportError::RenderTimeout
        ));
        assert!(matches!(
            ReportError::from(RenderError::OverCapacity),
            ReportError::RenderOverCapacity
        ));
        assert!(matches!(
            ReportError::from(RenderError::Unavailable),
            ReportError::RenderUnavailable
        ));
        assert!(matches!(
            ReportError::from(RenderError::Backend {
                status: 500,
                body: "boom".into()
            }),
            ReportError::RenderFailed(_)
        ));
    }

    #[test]
    fn test_schedule_errors_map_to_taxonomy() {
        let err: ReportError = ScheduleError::InvalidTimezone("X/Y".into()).into();
        assert!(matches!(err, ReportError::InvalidTimezone(tz) if tz == "X/Y"));

        let err: ReportError = ScheduleError::InvalidCronExpression {
            expr: "bad".into(),
            reason: "too few fields".into(),
        }
        .into();
        assert!(matches!(err, ReportError::InvalidCronExpression(_)));
    }

    #[test]
    fn test_quota_exceeded_display() {
        let err = ReportError::QuotaExceeded { limit: 5, count: 5 };
        assert_eq!(err.to_string(), "Report quota exceeded (5/5)");
    }
}
