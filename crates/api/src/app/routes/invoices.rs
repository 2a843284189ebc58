use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post, put},
};

use stagebill_auth::Permission;
use stagebill_infra::BillingService;
use stagebill_invoicing::LineItemDraft;

use crate::app::routes::common::{CmdAuth, guard, guard_read};
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/sweep-overdue", post(sweep_overdue))
        .route("/:id", get(get_invoice))
        .route("/:id/items", post(add_line_item))
        .route("/:id/items/:line_no", put(update_line_item).delete(remove_line_item))
        .route("/:id/tax-rate", put(set_tax_rate))
        .route("/:id/send", post(send_invoice))
        .route("/:id/viewed", post(mark_viewed))
        .route("/:id/payments", post(apply_payment))
        .route("/:id/cancel", post(cancel_invoice))
        .route("/:id/document", get(render_document))
}

pub async fn create_invoice(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> axum::response::Response {
    let new = match body.into_new_invoice() {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new(new, Permission::INVOICES_CREATE);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.create_invoice(tenant.organization_id(), principal.principal_id(), cmd_auth.inner) {
        Ok(snapshot) => (StatusCode::CREATED, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn list_invoices(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(res) = guard_read(&tenant, &principal, &Permission::INVOICES_READ) {
        return res;
    }

    let items = billing.list_invoices(tenant.organization_id());
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_invoice(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    if let Err(res) = guard_read(&tenant, &principal, &Permission::INVOICES_READ) {
        return res;
    }

    match billing.get_invoice(tenant.organization_id(), invoice_id) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn add_line_item(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(item): Json<LineItemDraft>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new(item, Permission::INVOICES_EDIT);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.add_line_item(tenant.organization_id(), invoice_id, cmd_auth.inner) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn update_line_item(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
    Json(item): Json<LineItemDraft>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new(item, Permission::INVOICES_EDIT);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.update_line_item(tenant.organization_id(), invoice_id, line_no, cmd_auth.inner) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn remove_line_item(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new(line_no, Permission::INVOICES_EDIT);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.remove_line_item(tenant.organization_id(), invoice_id, cmd_auth.inner) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn set_tax_rate(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetTaxRateRequest>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new(body.tax_rate, Permission::INVOICES_EDIT);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.set_tax_rate(tenant.organization_id(), invoice_id, cmd_auth.inner) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

/// Email (when a recipient is given) and mark as sent. The body is optional.
pub async fn send_invoice(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::SendInvoiceRequest>>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let cmd_auth = CmdAuth::new(body.recipient, Permission::INVOICES_SEND);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.send_invoice(
        tenant.organization_id(),
        invoice_id,
        principal.principal_id(),
        cmd_auth.inner.as_deref(),
    ) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn mark_viewed(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new(invoice_id, Permission::INVOICES_SEND);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.mark_viewed(tenant.organization_id(), cmd_auth.inner) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn apply_payment(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ApplyPaymentRequest>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd_auth = CmdAuth::new(body, Permission::INVOICES_PAY);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    let payment = cmd_auth.inner;
    match billing.apply_payment(
        tenant.organization_id(),
        invoice_id,
        principal.principal_id(),
        payment.amount,
        payment.payment_date,
    ) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn cancel_invoice(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelInvoiceRequest>>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let cmd_auth = CmdAuth::new(body.reason, Permission::INVOICES_CANCEL);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    match billing.cancel_invoice(
        tenant.organization_id(),
        invoice_id,
        principal.principal_id(),
        cmd_auth.inner,
    ) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn render_document(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    if let Err(res) = guard_read(&tenant, &principal, &Permission::INVOICES_READ) {
        return res;
    }

    match billing.render_invoice(tenant.organization_id(), invoice_id) {
        Ok(doc) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, doc.content_type),
                (
                    header::CONTENT_DISPOSITION,
                    format!("inline; filename=\"{}\"", doc.file_name),
                ),
            ],
            doc.body,
        )
            .into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn sweep_overdue(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let cmd_auth = CmdAuth::new(tenant.organization_id(), Permission::INVOICES_SWEEP);
    if let Err(res) = guard(&tenant, &principal, &cmd_auth) {
        return res;
    }

    let moved = billing.sweep_all_overdue(cmd_auth.inner);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "moved": moved.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        })),
    )
        .into_response()
}
