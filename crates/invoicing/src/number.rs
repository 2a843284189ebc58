use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use stagebill_core::{DomainError, DomainResult};

/// Organization-unique invoice number, e.g. `INV-00042`.
///
/// Issued once at creation by the numbering allocator and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn format(prefix: &str, sequence: u64) -> Self {
        Self(format!("{prefix}-{sequence:05}"))
    }

    pub fn parse(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DomainError::validation("invoice number must not be empty"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric part after the last `-`, if there is one.
    pub fn sequence(&self) -> Option<u64> {
        let (_, digits) = self.0.rsplit_once('-')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Order of issue: by sequence where both numbers have one, so
    /// `INV-99999` comes before `INV-100000`; by text otherwise.
    pub fn issue_order(&self, other: &Self) -> Ordering {
        match (self.sequence(), other.sequence()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padded_sequence() {
        assert_eq!(InvoiceNumber::format("INV", 42).as_str(), "INV-00042");
        assert_eq!(InvoiceNumber::format("ACME", 123456).as_str(), "ACME-123456");
    }

    #[test]
    fn sequence_is_the_trailing_number() {
        assert_eq!(InvoiceNumber::format("INV", 42).sequence(), Some(42));
        assert_eq!(InvoiceNumber::format("ACME-EU", 7).sequence(), Some(7));
        assert_eq!(InvoiceNumber::parse("MANUAL").unwrap().sequence(), None);
        assert_eq!(InvoiceNumber::parse("INV-12a").unwrap().sequence(), None);
        assert_eq!(InvoiceNumber::parse("INV-").unwrap().sequence(), None);
    }

    #[test]
    fn issue_order_compares_sequences_numerically() {
        let small = InvoiceNumber::format("INV", 99_999);
        let large = InvoiceNumber::format("INV", 100_000);

        assert!(large.as_str() < small.as_str());
        assert_eq!(small.issue_order(&large), Ordering::Less);
        assert_eq!(large.issue_order(&small), Ordering::Greater);
        assert_eq!(small.issue_order(&small.clone()), Ordering::Equal);
    }

    #[test]
    fn blank_numbers_are_rejected() {
        assert!(InvoiceNumber::parse("  ").is_err());
    }
}
