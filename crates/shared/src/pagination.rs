//! Keyset pagination for job history listings.
//!
//! Job executions are listed newest first. A cursor points at the last job of
//! the previous page as `(started_at, job_id)`, so jobs sharing a start
//! timestamp are still paged deterministically.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Default page size for job history.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Upper bound for a requested page size.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Error type for cursor operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("Invalid cursor format")]
    InvalidFormat,
    #[error("Invalid cursor encoding")]
    InvalidEncoding,
    #[error("Invalid timestamp in cursor")]
    InvalidTimestamp,
    #[error("Invalid job id in cursor")]
    InvalidId,
}

/// Position after which the next page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCursor {
    pub started_at: DateTime<Utc>,
    pub job_id: i64,
}

impl JobCursor {
    pub fn new(started_at: DateTime<Utc>, job_id: i64) -> Self {
        Self { started_at, job_id }
    }

    /// Encodes as base64(RFC3339_timestamp|job_id).
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}|{}",
            self.started_at
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            self.job_id
        );
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(cursor: &str) -> Result<Self, CursorError> {
        let decoded = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|_| CursorError::InvalidEncoding)?;
        let s = String::from_utf8(decoded).map_err(|_| CursorError::InvalidFormat)?;

        let (ts, id) = s.rsplit_once('|').ok_or(CursorError::InvalidFormat)?;
        let job_id: i64 = id.parse().map_err(|_| CursorError::InvalidId)?;
        let started_at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| CursorError::InvalidTimestamp)?
            .with_timezone(&Utc);

        Ok(Self { started_at, job_id })
    }

    /// Whether an item at `(started_at, job_id)` comes after this cursor in
    /// newest-first order.
    pub fn precedes(&self, started_at: DateTime<Utc>, job_id: i64) -> bool {
        (started_at, job_id) < (self.started_at, self.job_id)
    }
}

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
pub fn clamp_page_size(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

/// One page of results plus the cursor for the following page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Build a page from `limit + 1` fetched rows: the extra row only signals
    /// that another page exists.
    pub fn from_overfetch(
        mut rows: Vec<T>,
        limit: i64,
        cursor_of: impl Fn(&T) -> JobCursor,
    ) -> Self {
        let limit = limit.max(0) as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(|last| cursor_of(last).encode())
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }
}
