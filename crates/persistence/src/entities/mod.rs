//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod job;
pub mod report;
pub mod tenant;

pub use job::{JobEntity, JobStatusEntity};
pub use report::{ReportEntity, REPORT_COLUMNS};
pub use tenant::TenantEntity;
