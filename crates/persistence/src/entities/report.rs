//! Report definition entity (`report_data` joined with `report_scheduler`).

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use domain::error::RepositoryError;
use domain::models::{DeliveryTarget, FileNameOptions, ReportDefinition, Schedule, TimeRange};

/// Columns selected for a [`ReportEntity`]; expects aliases `r` and `s`.
pub const REPORT_COLUMNS: &str = r#"
    r.id, r.org_id, r.user_id, r.dashboard_id, r.dashboard_uid, r.name,
    r.format, r.layout, r.orientation, r.theme, r.time_from, r.time_to,
    r.filters, r.panel_id, r.delivery, r.stamp_date, r.stamp_time, r.enabled,
    r.created_at, r.updated_at,
    s.cron, s.timezone, s.start_at, s.end_at, s.next_run_at, s.last_run_at
"#;

/// Database row of a report with its schedule.
#[derive(Debug, Clone, FromRow)]
pub struct ReportEntity {
    pub id: i64,
    pub org_id: i64,
    pub user_id: i64,
    pub dashboard_id: i64,
    pub dashboard_uid: String,
    pub name: String,
    pub format: String,
    pub layout: String,
    pub orientation: String,
    pub theme: String,
    pub time_from: Option<String>,
    pub time_to: Option<String>,
    pub filters: Option<String>,
    pub panel_id: Option<i64>,
    pub delivery: Json<DeliveryTarget>,
    pub stamp_date: bool,
    pub stamp_time: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cron: String,
    pub timezone: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReportEntity> for ReportDefinition {
    type Error = RepositoryError;

    fn try_from(entity: ReportEntity) -> Result<Self, Self::Error> {
        let time_range = match (entity.time_from, entity.time_to) {
            (Some(from), Some(to)) => Some(TimeRange { from, to }),
            _ => None,
        };

        Ok(Self {
            id: entity.id,
            org_id: entity.org_id,
            owner_user_id: entity.user_id,
            dashboard_id: entity.dashboard_id,
            dashboard_uid: entity.dashboard_uid,
            name: entity.name,
            format: entity.format.parse().map_err(RepositoryError::Corrupt)?,
            layout: entity.layout.parse().map_err(RepositoryError::Corrupt)?,
            orientation: entity.orientation.parse().map_err(RepositoryError::Corrupt)?,
            theme: entity.theme.parse().map_err(RepositoryError::Corrupt)?,
            time_range,
            filters: entity.filters,
            panel_id: entity.panel_id,
            delivery: entity.delivery.0,
            file_name: FileNameOptions {
                stamp_date: entity.stamp_date,
                stamp_time: entity.stamp_time,
            },
            enabled: entity.enabled,
            schedule: Schedule {
                cron: entity.cron,
                timezone: entity.timezone,
                start_at: entity.start_at,
                end_at: entity.end_at,
            },
            next_run_at: entity.next_run_at,
            last_run_at: entity.last_run_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{ReportFormat, Theme};

    fn entity() -> ReportEntity {
        ReportEntity {
            id: 1,
            org_id: 2,
            user_id: 3,
            dashboard_id: 4,
            dashboard_uid: "abc".to_string(),
            name: "Weekly".to_string(),
            format: "xls".to_string(),
            layout: "grid".to_string(),
            orientation: "landscape".to_string(),
            theme: "dark".to_string(),
            time_from: Some("now-7d".to_string()),
            time_to: Some("now".to_string()),
            filters: None,
            panel_id: Some(5),
            delivery: Json(DeliveryTarget::Storage),
            stamp_date: true,
            stamp_time: false,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            cron: "0 9 * * 1".to_string(),
            timezone: "UTC".to_string(),
            start_at: None,
            end_at: None,
            next_run_at: Some(Utc::now()),
            last_run_at: None,
        }
    }

    #[test]
    fn test_entity_to_report() {
        let report = ReportDefinition::try_from(entity()).unwrap();
        assert_eq!(report.owner_user_id, 3);
        assert_eq!(report.format, ReportFormat::Xls);
        assert_eq!(report.theme, Theme::Dark);
        assert_eq!(report.time_range, Some(TimeRange::new("now-7d", "now")));
        assert!(report.file_name.stamp_date);
        assert_eq!(report.schedule.cron, "0 9 * * 1");
    }

    #[test]
    fn test_partial_time_range_is_none() {
        let mut e = entity();
        e.time_to = None;
        assert!(ReportDefinition::try_from(e).unwrap().time_range.is_none());
    }

    #[test]
    fn test_unknown_format_is_corrupt() {
        let mut e = entity();
        e.format = "docx".to_string();
        assert!(matches!(
            ReportDefinition::try_from(e),
            Err(RepositoryError::Corrupt(_))
        ));
    }
}
