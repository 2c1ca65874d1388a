//! Domain models for the report scheduler.

pub mod job;
pub mod report;
pub mod tenant;

pub use job::{
    derive_from_history, derive_job_state, DownloadLink, JobDetail, JobExecution, JobState,
    JobStatusEvent, StatusCode, DEFAULT_STALE_AFTER_SECS,
};
pub use report::{
    CreateReportRequest, DeliveryTarget, EmailTarget, FileNameOptions, FtpProtocol, FtpTarget,
    NewReport, Orientation, ReportDefinition, ReportFormat, ReportIdsRequest, ReportLayout,
    ReportQuery, Schedule, Theme, TimeRange, UpdateReportRequest,
};
pub use tenant::{
    QuotaDefaults, SubscriptionType, TenantQuota, UpdateQuotaRequest, LICENSED_REPORT_LIMIT,
    TRIAL_REPORT_LIMIT,
};
