//! Domain layer of the report scheduler.
//!
//! This crate contains:
//! - Domain models (ReportDefinition, JobExecution, TenantQuota)
//! - Repository traits with in-memory implementations
//! - Business logic services (scheduling, quotas, rendering, delivery, job tracking)
//! - Domain error types

pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

pub use error::{
    CollaboratorError, DeliveryError, RenderError, ReportError, RepositoryError, ScheduleError,
};
