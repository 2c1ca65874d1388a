//! Shared utilities and common types for the report scheduler.
//!
//! This crate provides common functionality used across all other crates:
//! - Render-key token generation
//! - Common validation logic
//! - Cursor pagination for job history

pub mod crypto;
pub mod pagination;
pub mod validation;
