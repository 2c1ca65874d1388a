//! Report definition domain model.
//!
//! A report definition is a saved configuration describing which dashboard to
//! render, in which format, on what schedule, and where to send the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use shared::validation::{
    validate_cron_shape, validate_email, validate_recipients, validate_remote_dir,
    validate_timezone,
};

/// Output format of a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Csv,
    Xls,
}

impl ReportFormat {
    /// File extension for artifacts of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Csv => "csv",
            ReportFormat::Xls => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Csv => "text/csv",
            ReportFormat::Xls => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Pdf => write!(f, "pdf"),
            ReportFormat::Csv => write!(f, "csv"),
            ReportFormat::Xls => write!(f, "xls"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(ReportFormat::Pdf),
            "csv" => Ok(ReportFormat::Csv),
            "xls" | "xlsx" => Ok(ReportFormat::Xls),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

/// Page layout used for PDF rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportLayout {
    #[default]
    Simple,
    Grid,
}

impl fmt::Display for ReportLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportLayout::Simple => write!(f, "simple"),
            ReportLayout::Grid => write!(f, "grid"),
        }
    }
}

impl FromStr for ReportLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(ReportLayout::Simple),
            "grid" => Ok(ReportLayout::Grid),
            _ => Err(format!("Unknown layout: {}", s)),
        }
    }
}

/// Page orientation used for PDF rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            _ => Err(format!("Unknown orientation: {}", s)),
        }
    }
}

/// Dashboard theme used for PDF rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(format!("Unknown theme: {}", s)),
        }
    }
}

/// Dashboard time range expressed in dashboard syntax (`now-7d`, `now`, ISO).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

impl TimeRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::new("now-6h", "now")
    }
}

/// Protocol for file-transfer delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtpProtocol {
    #[default]
    Ftp,
    Sftp,
}

/// Email delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailTarget {
    #[validate(custom(function = "validate_recipients"))]
    pub recipients: Vec<String>,

    #[validate(length(max = 255, message = "Subject must be at most 255 characters"))]
    #[serde(default)]
    pub subject: String,

    #[validate(length(max = 10000, message = "Message must be at most 10000 characters"))]
    #[serde(default)]
    pub message: String,

    #[validate(custom(function = "validate_email"))]
    #[serde(default)]
    pub reply_to: Option<String>,
}

fn validate_protocol(protocol: &FtpProtocol) -> Result<(), validator::ValidationError> {
    match protocol {
        FtpProtocol::Ftp => Ok(()),
        FtpProtocol::Sftp => {
            let mut err = validator::ValidationError::new("protocol_unsupported");
            err.message = Some("SFTP delivery is not supported; use ftp".into());
            Err(err)
        }
    }
}

/// File-transfer delivery settings.
///
/// The password is omitted from serialized output when empty; API responses
/// go through [`ReportDefinition::redacted`], which empties it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FtpTarget {
    #[validate(length(min = 1, max = 255, message = "Host must be 1-255 characters"))]
    pub host: String,
    pub port: u16,
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[validate(custom(function = "validate_protocol"))]
    #[serde(default)]
    pub protocol: FtpProtocol,
    #[validate(custom(function = "validate_remote_dir"))]
    #[serde(default)]
    pub directory: String,
}

/// Where a finished artifact goes after rendering.
///
/// Archival to object storage happens independently of the target whenever
/// storage is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeliveryTarget {
    Email(EmailTarget),
    Ftp(FtpTarget),
    /// Only archive; users download through presigned links.
    Storage,
}

impl DeliveryTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryTarget::Email(_) => "email",
            DeliveryTarget::Ftp(_) => "ftp",
            DeliveryTarget::Storage => "storage",
        }
    }

    /// Copy with credentials removed.
    pub fn redacted(&self) -> DeliveryTarget {
        match self {
            DeliveryTarget::Ftp(target) => DeliveryTarget::Ftp(FtpTarget {
                password: String::new(),
                ..target.clone()
            }),
            other => other.clone(),
        }
    }

    /// Keep `stored`'s FTP password when this target leaves it blank for the
    /// same host and account.
    pub fn inherit_password(&mut self, stored: &DeliveryTarget) {
        if let (DeliveryTarget::Ftp(next), DeliveryTarget::Ftp(prev)) = (self, stored) {
            if next.password.is_empty() && next.host == prev.host && next.username == prev.username
            {
                next.password = prev.password.clone();
            }
        }
    }

    fn validate_inner(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            DeliveryTarget::Email(target) => target.validate(),
            DeliveryTarget::Ftp(target) => target.validate(),
            DeliveryTarget::Storage => Ok(()),
        }
    }
}

/// Controls how the artifact file name is stamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNameOptions {
    #[serde(default)]
    pub stamp_date: bool,
    #[serde(default)]
    pub stamp_time: bool,
}

/// Recurrence settings of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[validate(custom(function = "validate_cron_shape"))]
    pub cron: String,

    #[validate(custom(function = "validate_timezone"))]
    pub timezone: String,

    /// Runs before this instant are skipped by the due-report poller.
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,

    /// Runs after this instant are skipped by the due-report poller.
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Whether `now` falls inside the optional start/end bounds.
    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        self.start_at.map_or(true, |start| now >= start)
            && self.end_at.map_or(true, |end| now <= end)
    }
}

/// A saved report definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDefinition {
    pub id: i64,
    pub org_id: i64,
    pub owner_user_id: i64,
    /// Immutable after creation.
    pub dashboard_id: i64,
    pub dashboard_uid: String,
    pub name: String,
    pub format: ReportFormat,
    pub layout: ReportLayout,
    pub orientation: Orientation,
    pub theme: Theme,
    /// Overrides the dashboard's own default time range when set.
    pub time_range: Option<TimeRange>,
    /// Template-variable filter expression appended to the dashboard URL,
    /// e.g. `var-host=web01&var-env=prod`.
    pub filters: Option<String>,
    /// Panel to export for CSV/XLS.
    pub panel_id: Option<i64>,
    pub delivery: DeliveryTarget,
    pub file_name: FileNameOptions,
    pub enabled: bool,
    pub schedule: Schedule,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportDefinition {
    /// Artifact file name, stamped per the definition's file-name options.
    pub fn artifact_file_name(&self, at: DateTime<Utc>) -> String {
        let mut base: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if base.is_empty() {
            base.push_str("report");
        }
        if self.file_name.stamp_date {
            base.push_str(&at.format("_%Y-%m-%d").to_string());
        }
        if self.file_name.stamp_time {
            base.push_str(&at.format("_%H-%M-%S").to_string());
        }
        format!("{}.{}", base, self.format.extension())
    }

    /// Copy safe to return to API callers.
    pub fn redacted(mut self) -> Self {
        self.delivery = self.delivery.redacted();
        self
    }

    /// Whether the poller should fire this report at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.schedule.in_window(now)
            && self.next_run_at.map_or(false, |next| next <= now)
    }
}

fn validate_delivery(target: &DeliveryTarget) -> Result<(), validator::ValidationError> {
    target.validate_inner().map_err(|errors| {
        let mut err = validator::ValidationError::new("delivery_invalid");
        err.message = Some(errors.to_string().into());
        err
    })
}

/// Request payload for creating a report definition.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    #[validate(length(min = 1, max = 190, message = "Name must be 1-190 characters"))]
    pub name: String,

    pub dashboard_id: i64,

    #[validate(length(min = 1, max = 40, message = "Dashboard UID must be 1-40 characters"))]
    pub dashboard_uid: String,

    pub format: ReportFormat,

    #[serde(default)]
    pub layout: ReportLayout,

    #[serde(default)]
    pub orientation: Orientation,

    #[serde(default)]
    pub theme: Theme,

    #[serde(default)]
    pub time_range: Option<TimeRange>,

    #[validate(length(max = 2048, message = "Filters must be at most 2048 characters"))]
    #[serde(default)]
    pub filters: Option<String>,

    #[serde(default)]
    pub panel_id: Option<i64>,

    #[validate(custom(function = "validate_delivery"))]
    pub delivery: DeliveryTarget,

    #[serde(default)]
    pub file_name: FileNameOptions,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[validate(nested)]
    pub schedule: Schedule,
}

/// Request payload for updating a report definition.
///
/// Carries the full definition; `dashboard_id` must equal the stored one.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportRequest {
    #[validate(length(min = 1, max = 190, message = "Name must be 1-190 characters"))]
    pub name: String,

    pub dashboard_id: i64,

    pub format: ReportFormat,

    #[serde(default)]
    pub layout: ReportLayout,

    #[serde(default)]
    pub orientation: Orientation,

    #[serde(default)]
    pub theme: Theme,

    #[serde(default)]
    pub time_range: Option<TimeRange>,

    #[validate(length(max = 2048, message = "Filters must be at most 2048 characters"))]
    #[serde(default)]
    pub filters: Option<String>,

    #[serde(default)]
    pub panel_id: Option<i64>,

    #[validate(custom(function = "validate_delivery"))]
    pub delivery: DeliveryTarget,

    #[serde(default)]
    pub file_name: FileNameOptions,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[validate(nested)]
    pub schedule: Schedule,
}

fn default_enabled() -> bool {
    true
}

/// Definition fields accepted by the store on insert.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub org_id: i64,
    pub owner_user_id: i64,
    pub request: CreateReportRequest,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Filter for searching report definitions within an org.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    #[serde(skip)]
    pub org_id: i64,
    pub user_id: Option<i64>,
    /// Case-insensitive substring match on the name.
    pub name: Option<String>,
    pub dashboard_id: Option<i64>,
}

impl ReportQuery {
    pub fn matches(&self, report: &ReportDefinition) -> bool {
        report.org_id == self.org_id
            && self.user_id.map_or(true, |u| report.owner_user_id == u)
            && self.dashboard_id.map_or(true, |d| report.dashboard_id == d)
            && self.name.as_ref().map_or(true, |needle| {
                report
                    .name
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            })
    }
}

/// Request body for bulk operations (delete/enable/disable).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReportIdsRequest {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 ids are required"))]
    pub ids: Vec<i64>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn create_request(name: &str, dashboard_id: i64) -> CreateReportRequest {
        CreateReportRequest {
            name: name.to_string(),
            dashboard_id,
            dashboard_uid: format!("dash-{}", dashboard_id),
            format: ReportFormat::Pdf,
            layout: ReportLayout::Simple,
            orientation: Orientation::Landscape,
            theme: Theme::Light,
            time_range: None,
            filters: None,
            panel_id: None,
            delivery: DeliveryTarget::Email(EmailTarget {
                recipients: vec!["ops@example.com".to_string()],
                subject: "Weekly".to_string(),
                message: "See attached".to_string(),
                reply_to: None,
            }),
            file_name: FileNameOptions::default(),
            enabled: true,
            schedule: Schedule {
                cron: "0 9 * * 1".to_string(),
                timezone: "America/New_York".to_string(),
                start_at: None,
                end_at: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn definition() -> ReportDefinition {
        let now = Utc::now();
        let req = fixtures::create_request("Weekly Summary", 7);
        ReportDefinition {
            id: 1,
            org_id: 1,
            owner_user_id: 2,
            dashboard_id: req.dashboard_id,
            dashboard_uid: req.dashboard_uid,
            name: req.name,
            format: req.format,
            layout: req.layout,
            orientation: req.orientation,
            theme: req.theme,
            time_range: None,
            filters: None,
            panel_id: None,
            delivery: req.delivery,
            file_name: FileNameOptions::default(),
            enabled: true,
            schedule: req.schedule,
            next_run_at: Some(now - Duration::minutes(1)),
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_report_format_from_str() {
        assert_eq!("PDF".parse::<ReportFormat>().unwrap(), ReportFormat::Pdf);
        assert_eq!("xlsx".parse::<ReportFormat>().unwrap(), ReportFormat::Xls);
        assert!("docx".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_report_format_extension() {
        assert_eq!(ReportFormat::Pdf.extension(), "pdf");
        assert_eq!(ReportFormat::Csv.extension(), "csv");
        assert_eq!(ReportFormat::Xls.extension(), "xlsx");
    }

    #[test]
    fn test_delivery_target_serialization() {
        let target = DeliveryTarget::Ftp(FtpTarget {
            host: "ftp.example.com".into(),
            port: 21,
            username: "reports".into(),
            password: "secret".into(),
            protocol: FtpProtocol::Ftp,
            directory: "/weekly".into(),
        });
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["type"], "ftp");
        assert_eq!(json["directory"], "/weekly");

        let back: DeliveryTarget = serde_json::from_value(json).unwrap();
        assert_eq!(back, target);
    }

    fn ftp_target(password: &str) -> FtpTarget {
        FtpTarget {
            host: "ftp.example.com".into(),
            port: 21,
            username: "reports".into(),
            password: password.into(),
            protocol: FtpProtocol::Ftp,
            directory: "/weekly".into(),
        }
    }

    #[test]
    fn test_redacted_definition_hides_ftp_password() {
        let mut report = definition();
        report.delivery = DeliveryTarget::Ftp(ftp_target("hunter2"));

        let json = serde_json::to_string(&report.clone().redacted()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("password"));
        assert!(json.contains("ftp.example.com"));

        // Stored form keeps the secret.
        let stored = serde_json::to_string(&report.delivery).unwrap();
        assert!(stored.contains("hunter2"));
    }

    #[test]
    fn test_blank_password_inherits_for_same_account() {
        let stored = DeliveryTarget::Ftp(ftp_target("hunter2"));

        let mut edit = DeliveryTarget::Ftp(ftp_target(""));
        edit.inherit_password(&stored);
        assert_eq!(edit, stored);

        let mut moved = DeliveryTarget::Ftp(FtpTarget {
            host: "other.example.com".into(),
            ..ftp_target("")
        });
        moved.inherit_password(&stored);
        match moved {
            DeliveryTarget::Ftp(target) => assert!(target.password.is_empty()),
            other => panic!("unexpected target: {:?}", other),
        }

        let mut changed = DeliveryTarget::Ftp(ftp_target("new-secret"));
        changed.inherit_password(&stored);
        assert_eq!(changed, DeliveryTarget::Ftp(ftp_target("new-secret")));
    }

    #[test]
    fn test_sftp_target_rejected_by_validation() {
        let mut request = fixtures::create_request("Weekly", 1);
        request.delivery = DeliveryTarget::Ftp(ftp_target("p"));
        assert!(request.validate().is_ok());

        request.delivery = DeliveryTarget::Ftp(FtpTarget {
            protocol: FtpProtocol::Sftp,
            ..ftp_target("p")
        });
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("SFTP"));
    }

    #[test]
    fn test_artifact_file_name_stamping() {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 9, 5, 6).unwrap();
        let mut report = definition();
        assert_eq!(report.artifact_file_name(at), "Weekly_Summary.pdf");

        report.file_name = FileNameOptions {
            stamp_date: true,
            stamp_time: true,
        };
        assert_eq!(
            report.artifact_file_name(at),
            "Weekly_Summary_2024-03-04_09-05-06.pdf"
        );
    }

    #[test]
    fn test_is_due_respects_enabled_and_window() {
        let now = Utc::now();
        let mut report = definition();
        assert!(report.is_due(now));

        report.enabled = false;
        assert!(!report.is_due(now));

        report.enabled = true;
        report.schedule.end_at = Some(now - Duration::hours(1));
        assert!(!report.is_due(now));

        report.schedule.end_at = None;
        report.schedule.start_at = Some(now + Duration::hours(1));
        assert!(!report.is_due(now));
    }

    #[test]
    fn test_create_request_validation() {
        let ok = fixtures::create_request("Weekly", 1);
        assert!(ok.validate().is_ok());

        let mut empty_name = ok.clone();
        empty_name.name = String::new();
        assert!(empty_name.validate().is_err());

        let mut bad_recipient = ok.clone();
        bad_recipient.delivery = DeliveryTarget::Email(EmailTarget {
            recipients: vec!["nope".into()],
            subject: String::new(),
            message: String::new(),
            reply_to: None,
        });
        assert!(bad_recipient.validate().is_err());

        let mut bad_tz = ok;
        bad_tz.schedule.timezone = "Nowhere/City".into();
        assert!(bad_tz.validate().is_err());
    }

    #[test]
    fn test_report_query_matches() {
        let report = definition();
        let mut query = ReportQuery {
            org_id: 1,
            name: Some("summary".into()),
            ..Default::default()
        };
        assert!(query.matches(&report));

        query.dashboard_id = Some(99);
        assert!(!query.matches(&report));

        let other_org = ReportQuery {
            org_id: 2,
            ..Default::default()
        };
        assert!(!other_org.matches(&report));
    }
}
