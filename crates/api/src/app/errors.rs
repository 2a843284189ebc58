use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stagebill_core::DomainError;
use stagebill_infra::BillingError;
use stagebill_infra::command_dispatcher::DispatchError;
use stagebill_infra::mailer::MailerError;

pub fn billing_error_to_response(err: BillingError) -> axum::response::Response {
    match err {
        BillingError::Dispatch(e) => dispatch_error_to_response(e),
        BillingError::Numbering(e) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "numbering_unavailable", e.to_string())
        }
        BillingError::Mail(e @ MailerError::InvalidRecipient(_)) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_recipient", e.to_string())
        }
        BillingError::Mail(e) => json_error(StatusCode::BAD_GATEWAY, "mail_error", e.to_string()),
        BillingError::Render(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "render_error", e.to_string())
        }
        BillingError::Projection(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "projection_error", e.to_string())
        }
        BillingError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Domain(e) => domain_error_to_response(e),
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::TenantIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg)
        }
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let (status, code) = match &err {
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
        DomainError::InvalidState(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state"),
        DomainError::InvalidTransition { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition")
        }
        DomainError::AmountMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "amount_mismatch"),
        DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
    };
    json_error(status, code, err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("invoice"), StatusCode::NOT_FOUND),
            (DomainError::invalid_transition("paid", "sent"), StatusCode::UNPROCESSABLE_ENTITY),
            (
                DomainError::AmountMismatch {
                    expected: Decimal::from(275),
                    actual: Decimal::from(274),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn lost_races_are_conflicts() {
        let res = dispatch_error_to_response(DispatchError::Concurrency("stale".to_string()));
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }
}
