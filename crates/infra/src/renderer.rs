//! Invoice documents.

use std::fmt::Write;

use serde::Serialize;
use thiserror::Error;

use stagebill_invoicing::InvoiceSnapshot;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to format document: {0}")]
    Format(#[from] std::fmt::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    pub file_name: String,
    pub content_type: String,
    pub body: String,
}

/// Turns an invoice into a document. Must depend on the snapshot alone.
pub trait InvoiceRenderer: Send + Sync {
    fn render(&self, invoice: &InvoiceSnapshot) -> Result<RenderedDocument, RenderError>;
}

/// Fixed-width plain-text statement.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextInvoiceRenderer;

impl InvoiceRenderer for TextInvoiceRenderer {
    fn render(&self, invoice: &InvoiceSnapshot) -> Result<RenderedDocument, RenderError> {
        let mut out = String::new();

        writeln!(out, "INVOICE {}", invoice.invoice_number.as_str())?;
        writeln!(out, "Status:     {}", invoice.status)?;
        writeln!(out, "Issued:     {}", invoice.issue_date)?;
        writeln!(out, "Due:        {}", invoice.due_date)?;
        writeln!(out, "Client:     {}", invoice.client_id)?;
        writeln!(out, "Project:    {}", invoice.project_id)?;
        if let Some(phase_id) = invoice.phase_id {
            writeln!(out, "Phase:      {phase_id}")?;
        }
        writeln!(out)?;

        writeln!(
            out,
            "{:>3}  {:<32} {:<10} {:>10} {:>12} {:>12}",
            "#", "Description", "Type", "Qty", "Unit price", "Amount"
        )?;
        for item in &invoice.items {
            writeln!(
                out,
                "{:>3}  {:<32} {:<10} {:>10} {:>12} {:>12}",
                item.line_no,
                item.description,
                item.item_type.as_str(),
                item.quantity,
                item.unit_price,
                item.amount
            )?;
        }
        writeln!(out)?;

        writeln!(out, "{:>70} {:>12}", "Subtotal", invoice.subtotal)?;
        writeln!(out, "{:>70} {:>12}", format!("Tax ({}%)", invoice.tax_rate), invoice.tax_amount)?;
        writeln!(out, "{:>70} {:>12}", "Total", invoice.total_amount)?;
        writeln!(out, "{:>70} {:>12}", "Paid", invoice.paid_amount)?;
        writeln!(out, "{:>70} {:>12}", "Balance due", invoice.balance_amount)?;
        if let Some(paid_on) = invoice.last_payment_date {
            writeln!(out, "Paid on {paid_on}")?;
        }

        Ok(RenderedDocument {
            file_name: format!("{}.txt", invoice.invoice_number.as_str()),
            content_type: "text/plain; charset=utf-8".to_string(),
            body: out,
        })
    }
}
