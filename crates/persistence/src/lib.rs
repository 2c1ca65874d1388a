//! Persistence layer of the report scheduler.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Postgres implementations of the domain repository traits

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;

pub use repositories::{PgJobRepository, PgReportRepository, PgTenantRepository};
