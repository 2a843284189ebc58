//! Outbound invoice email.
//!
//! Delivery lives outside the billing core. Marking an invoice as sent never
//! depends on a mailer succeeding.

use std::sync::Mutex;

use thiserror::Error;

use stagebill_invoicing::{InvoiceId, InvoiceSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailerError {
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("email delivery failed: {0}")]
    Delivery(String),
}

/// Sends an invoice to a recipient.
pub trait InvoiceMailer: Send + Sync {
    fn send_invoice_email(
        &self,
        invoice: &InvoiceSnapshot,
        recipient: &str,
    ) -> Result<(), MailerError>;
}

fn check_recipient(recipient: &str) -> Result<(), MailerError> {
    let trimmed = recipient.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(MailerError::InvalidRecipient(recipient.to_string())),
    }
}

/// Development mailer: writes the delivery to the log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl InvoiceMailer for LogMailer {
    fn send_invoice_email(
        &self,
        invoice: &InvoiceSnapshot,
        recipient: &str,
    ) -> Result<(), MailerError> {
        check_recipient(recipient)?;
        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = invoice.invoice_number.as_str(),
            recipient,
            total = %invoice.total_amount,
            "invoice email dispatched"
        );
        Ok(())
    }
}

/// Keeps every delivery in memory.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(InvoiceId, String)>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(InvoiceId, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl InvoiceMailer for RecordingMailer {
    fn send_invoice_email(
        &self,
        invoice: &InvoiceSnapshot,
        recipient: &str,
    ) -> Result<(), MailerError> {
        check_recipient(recipient)?;
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailerError::Delivery("lock poisoned".to_string()))?;
        sent.push((invoice.id, recipient.to_string()));
        Ok(())
    }
}

/// Always fails; stands in for an unreachable mail provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingMailer;

impl InvoiceMailer for FailingMailer {
    fn send_invoice_email(
        &self,
        _invoice: &InvoiceSnapshot,
        _recipient: &str,
    ) -> Result<(), MailerError> {
        Err(MailerError::Delivery("mail provider unreachable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_need_a_local_part_and_a_domain() {
        assert!(check_recipient("billing@client.example").is_ok());
        assert!(check_recipient("billing@").is_err());
        assert!(check_recipient("@client.example").is_err());
        assert!(check_recipient("nobody").is_err());
    }
}
