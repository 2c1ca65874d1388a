//! Custom Axum extractors.

pub mod caller;

pub use caller::{Caller, ORG_ID_HEADER, USER_ID_HEADER};
