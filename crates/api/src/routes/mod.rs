//! HTTP route handlers.

pub mod health;
pub mod jobs;
pub mod render_keys;
pub mod reports;
pub mod tenants;
