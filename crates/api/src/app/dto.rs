use std::str::FromStr;

use axum::http::StatusCode;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use stagebill_core::AggregateId;
use stagebill_infra::NewInvoice;
use stagebill_invoicing::{ClientId, InvoiceId, LineItemDraft};
use stagebill_projects::{DeliverableId, PhaseId, ProjectId};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AdoptChecklistRequest {
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub project_id: String,
    pub phase_id: Option<String>,
    pub client_id: String,
    /// `YYYY-MM-DD`; today when omitted.
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<LineItemDraft>,
}

impl CreateInvoiceRequest {
    pub fn into_new_invoice(self) -> Result<NewInvoice, axum::response::Response> {
        let phase_id = match self.phase_id.as_deref() {
            Some(raw) => Some(PhaseId::new(parse_aggregate_id(raw, "phase_id")?)),
            None => None,
        };

        Ok(NewInvoice {
            project_id: ProjectId::new(parse_aggregate_id(&self.project_id, "project_id")?),
            phase_id,
            client_id: ClientId::new(parse_aggregate_id(&self.client_id, "client_id")?),
            issue_date: self.issue_date,
            due_date: self.due_date,
            tax_rate: self.tax_rate,
            items: self.items,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SetTaxRateRequest {
    pub tax_rate: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendInvoiceRequest {
    pub recipient: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyPaymentRequest {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelInvoiceRequest {
    pub reason: Option<String>,
}

// -------------------------
// Path parsing
// -------------------------

pub fn parse_aggregate_id(raw: &str, what: &str) -> Result<AggregateId, axum::response::Response> {
    parse(raw, what)
}

pub fn parse_invoice_id(raw: &str) -> Result<InvoiceId, axum::response::Response> {
    parse_aggregate_id(raw, "invoice id").map(InvoiceId::new)
}

pub fn parse_phase_id(raw: &str) -> Result<PhaseId, axum::response::Response> {
    parse_aggregate_id(raw, "phase id").map(PhaseId::new)
}

pub fn parse_deliverable_id(raw: &str) -> Result<DeliverableId, axum::response::Response> {
    parse(raw, "deliverable id")
}

fn parse<T: FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what}")))
}
