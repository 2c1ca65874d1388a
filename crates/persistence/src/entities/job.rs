//! Job execution and status entities (`job_queue`, `job_status`).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::error::RepositoryError;
use domain::models::{JobExecution, JobStatusEvent};

/// Database row mapping for the job_queue table.
#[derive(Debug, Clone, FromRow)]
pub struct JobEntity {
    pub id: i64,
    pub report_id: i64,
    pub org_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
    pub storage_key: Option<String>,
    pub storage_version: Option<String>,
    pub deleted: bool,
}

impl From<JobEntity> for JobExecution {
    fn from(entity: JobEntity) -> Self {
        Self {
            id: entity.id,
            report_id: entity.report_id,
            org_id: entity.org_id,
            started_at: entity.started_at,
            finished_at: entity.finished_at,
            elapsed_ms: entity.elapsed_ms,
            storage_key: entity.storage_key,
            storage_version: entity.storage_version,
            deleted: entity.deleted,
        }
    }
}

/// Database row mapping for the job_status table.
#[derive(Debug, Clone, FromRow)]
pub struct JobStatusEntity {
    pub id: i64,
    pub job_id: i64,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub description: String,
}

impl TryFrom<JobStatusEntity> for JobStatusEvent {
    type Error = RepositoryError;

    fn try_from(entity: JobStatusEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            id: entity.id,
            job_id: entity.job_id,
            timestamp: entity.created_at,
            status: entity.status.parse().map_err(RepositoryError::Corrupt)?,
            description: entity.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::StatusCode;

    #[test]
    fn test_status_entity_conversion() {
        let entity = JobStatusEntity {
            id: 1,
            job_id: 2,
            created_at: Utc::now(),
            status: "failed".to_string(),
            description: "renderer timed out".to_string(),
        };
        let event = JobStatusEvent::try_from(entity).unwrap();
        assert_eq!(event.status, StatusCode::Fail);
        assert_eq!(event.job_id, 2);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let entity = JobStatusEntity {
            id: 1,
            job_id: 2,
            created_at: Utc::now(),
            status: "exploded".to_string(),
            description: String::new(),
        };
        assert!(JobStatusEvent::try_from(entity).is_err());
    }
}
