//! Caller identity set by the upstream auth proxy.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::services::RENDER_KEY_HEADER;

use crate::error::ApiError;

pub const ORG_ID_HEADER: &str = "X-Org-Id";
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Org and user the request acts for.
///
/// Role checks happen upstream; handlers only scope queries to `org_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub org_id: i64,
    pub user_id: i64,
    /// Long-lived render key to reuse for renders made on this request.
    pub render_session: Option<String>,
}

fn id_header(parts: &Parts, name: &str) -> Result<i64, ApiError> {
    let raw = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", name)))?;
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::Unauthorized(format!("Invalid {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let org_id = id_header(parts, ORG_ID_HEADER)?;
        let user_id = id_header(parts, USER_ID_HEADER)?;
        let render_session = parts
            .headers
            .get(RENDER_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Ok(Caller {
            org_id,
            user_id,
            render_session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<Caller, ApiError> {
        let (mut parts, _) = req.into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_caller_from_headers() {
        let req = Request::builder()
            .header(ORG_ID_HEADER, "3")
            .header(USER_ID_HEADER, "42")
            .header(RENDER_KEY_HEADER, "rk_session")
            .body(())
            .unwrap();
        let caller = extract(req).await.unwrap();
        assert_eq!(caller.org_id, 3);
        assert_eq!(caller.user_id, 42);
        assert_eq!(caller.render_session.as_deref(), Some("rk_session"));
    }

    #[tokio::test]
    async fn test_missing_org_rejected() {
        let req = Request::builder()
            .header(USER_ID_HEADER, "42")
            .body(())
            .unwrap();
        assert!(matches!(extract(req).await, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_non_numeric_and_zero_ids_rejected() {
        let req = Request::builder()
            .header(ORG_ID_HEADER, "abc")
            .header(USER_ID_HEADER, "1")
            .body(())
            .unwrap();
        assert!(extract(req).await.is_err());

        let req = Request::builder()
            .header(ORG_ID_HEADER, "0")
            .header(USER_ID_HEADER, "1")
            .body(())
            .unwrap();
        assert!(extract(req).await.is_err());
    }
}
