use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stagebill_auth::Permission;
use stagebill_infra::BillingService;
use stagebill_projects::can_invoice;

use crate::app::routes::common::{CmdAuth, guard, guard_read};
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/:id/deliverables", post(adopt_checklist).get(list_deliverables))
        .route("/:id/deliverables/defaults", post(ensure_defaults))
        .route("/:id/deliverables/:deliverable_id/toggle", post(toggle_deliverable))
        .route("/:id/summary", get(phase_summary))
}

pub async fn ensure_defaults(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let phase_id = match dto::parse_phase_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new(phase_id, Permission::PHASES_WRITE);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.ensure_defaults(tenant.organization_id(), cmd_auth.inner) {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn adopt_checklist(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdoptChecklistRequest>,
) -> axum::response::Response {
    let phase_id = match dto::parse_phase_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new((phase_id, body.names), Permission::PHASES_WRITE);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    let (phase_id, names) = cmd_auth.inner;
    match billing.adopt_checklist(tenant.organization_id(), phase_id, names) {
        Ok(items) => (StatusCode::CREATED, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn list_deliverables(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let phase_id = match dto::parse_phase_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    if let Err(res) = guard_read(&tenant, &principal, &Permission::PHASES_READ) {
        return res;
    }

    match billing.deliverables(tenant.organization_id(), phase_id) {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn toggle_deliverable(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, deliverable_id)): Path<(String, String)>,
) -> axum::response::Response {
    let phase_id = match dto::parse_phase_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let deliverable_id = match dto::parse_deliverable_id(&deliverable_id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new((phase_id, deliverable_id), Permission::PHASES_WRITE);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    let (phase_id, deliverable_id) = cmd_auth.inner;
    match billing.toggle_deliverable(
        tenant.organization_id(),
        phase_id,
        deliverable_id,
        principal.principal_id(),
    ) {
        Ok(deliverable) => (StatusCode::OK, Json(deliverable)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn phase_summary(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let phase_id = match dto::parse_phase_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    if let Err(res) = guard_read(&tenant, &principal, &Permission::PHASES_READ) {
        return res;
    }

    match billing.phase_summary(tenant.organization_id(), phase_id) {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "phase_id": phase_id.to_string(),
                "summary": summary,
                "can_invoice": can_invoice(&summary),
            })),
        )
            .into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}
