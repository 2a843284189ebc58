//! Financial rollups over the organization's invoices.
//!
//! Each request sweeps and lists the directory once, then folds in memory.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use serde::Serialize;

use stagebill_auth::Permission;
use stagebill_core::DomainResult;
use stagebill_infra::BillingService;
use stagebill_invoicing::InvoiceSnapshot;
use stagebill_reporting as reporting;

use crate::app::errors;
use crate::app::routes::common::guard_read;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/overall", get(overall))
        .route("/by-status", get(by_status))
        .route("/by-phase", get(by_phase))
        .route("/by-project", get(by_project))
        .route("/by-charge-type", get(by_charge_type))
}

fn invoices(
    billing: &BillingService,
    tenant: &TenantContext,
    principal: &PrincipalContext,
) -> Result<Vec<InvoiceSnapshot>, axum::response::Response> {
    guard_read(tenant, principal, &Permission::REPORTS_READ)?;
    Ok(billing.list_invoices(tenant.organization_id()))
}

fn groups_response<K: Serialize>(
    groups: DomainResult<Vec<reporting::GroupSummary<K>>>,
) -> axum::response::Response {
    match groups {
        Ok(groups) => {
            (StatusCode::OK, Json(serde_json::json!({ "groups": groups }))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn overall(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match invoices(&billing, &tenant, &principal) {
        Ok(all) => match reporting::by_overall(&all) {
            Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
            Err(e) => errors::domain_error_to_response(e),
        },
        Err(res) => res,
    }
}

pub async fn by_status(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match invoices(&billing, &tenant, &principal) {
        Ok(all) => groups_response(reporting::by_status(&all)),
        Err(res) => res,
    }
}

pub async fn by_phase(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match invoices(&billing, &tenant, &principal) {
        Ok(all) => groups_response(reporting::by_phase(&all)),
        Err(res) => res,
    }
}

pub async fn by_project(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match invoices(&billing, &tenant, &principal) {
        Ok(all) => groups_response(reporting::by_project(&all)),
        Err(res) => res,
    }
}

pub async fn by_charge_type(
    Extension(billing): Extension<Arc<BillingService>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match invoices(&billing, &tenant, &principal) {
        Ok(all) => groups_response(reporting::by_charge_type(&all)),
        Err(res) => res,
    }
}
