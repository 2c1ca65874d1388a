use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::ReportError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Gone(msg) => (StatusCode::GONE, "gone", msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "bad_gateway", msg.clone()),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
            ApiError::GatewayTimeout(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, "gateway_timeout", msg.clone())
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        let message = err.to_string();
        match err {
            ReportError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            ReportError::NameAlreadyExists => ApiError::Conflict(message),
            ReportError::EditNotAllowed
            | ReportError::InvalidCronExpression(_)
            | ReportError::InvalidTimezone(_)
            | ReportError::Validation(_) => ApiError::Validation(message),
            ReportError::QuotaExceeded { .. } => ApiError::Forbidden(message),
            ReportError::QuotaConfigMissing(_)
            | ReportError::RenderUnavailable
            | ReportError::RenderOverCapacity => ApiError::ServiceUnavailable(message),
            ReportError::RenderTimeout => ApiError::GatewayTimeout(message),
            ReportError::RenderFailed(_) | ReportError::Delivery(_) => {
                ApiError::BadGateway(message)
            }
            ReportError::NotInStorage => ApiError::NotFound(message),
            ReportError::NotAvailable => ApiError::Gone(message),
            ReportError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .collect();

        let message = if messages.len() == 1 {
            messages[0].clone()
        } else {
            format!("{} validation errors", messages.len())
        };

        ApiError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeliveryError;

    fn status_of(err: ReportError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_report_error_status_mapping() {
        assert_eq!(
            status_of(ReportError::NotFound("report 1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(ReportError::NameAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_of(ReportError::EditNotAllowed), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ReportError::InvalidCronExpression("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ReportError::QuotaExceeded { limit: 5, count: 5 }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ReportError::QuotaConfigMissing("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ReportError::RenderOverCapacity),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(ReportError::RenderTimeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_of(ReportError::NotInStorage), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ReportError::NotAvailable), StatusCode::GONE);
        assert_eq!(
            status_of(ReportError::Delivery(DeliveryError::Email("smtp down".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(ReportError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = ApiError::from(ReportError::NotFound("report 7".into()));
        assert_eq!(err.to_string(), "Not found: report 7 not found");
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            format!("{}", ApiError::Gone("pruned".to_string())),
            "Gone: pruned"
        );
        assert_eq!(
            format!("{}", ApiError::Validation("test".to_string())),
            "Validation error: test"
        );
    }
}
