//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use projections::ProjectionError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path or body.
    BadRequest(String),
    /// Write-side failure.
    Domain(DomainError),
    /// Read-side failure.
    Projection(ProjectionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => domain_status(err),
            ApiError::Projection(ProjectionError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Projection(err) if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Projection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::BusinessRule(rule) if rule.is_validation() => StatusCode::BAD_REQUEST,
        DomainError::BusinessRule(_) => StatusCode::CONFLICT,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
        DomainError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DomainError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::EventStore(store_err) if store_err.is_transient() => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Domain(err) => err.to_string(),
            ApiError::Projection(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, %status, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, OrderId};
    use domain::{OrderError, OrderStatus};
    use event_store::EventStoreError;
    use std::time::Duration;

    #[test]
    fn business_rules_map_to_400_or_409() {
        let validation = ApiError::Domain(DomainError::BusinessRule(OrderError::NoShopItems));
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let state = ApiError::Domain(DomainError::BusinessRule(
            OrderError::InvalidStateTransition {
                current_state: OrderStatus::Canceled,
                action: "pay",
            },
        ));
        assert_eq!(state.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn infrastructure_errors_map_to_5xx() {
        let aggregate_id = AggregateId::new();
        let timeout = ApiError::Domain(DomainError::Timeout {
            aggregate_id,
            timeout: Duration::from_millis(50),
        });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let unavailable = ApiError::Domain(DomainError::StoreUnavailable {
            attempts: 3,
            source: EventStoreError::Unavailable("down".into()),
        });
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let conflict = ApiError::Domain(DomainError::ConcurrencyConflict {
            aggregate_id,
            attempts: 5,
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn read_side_errors() {
        let missing = ApiError::Projection(ProjectionError::NotFound(OrderId::new()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let down = ApiError::Projection(ProjectionError::StoreUnavailable("down".into()));
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
