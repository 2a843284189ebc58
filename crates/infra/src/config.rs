//! Billing configuration loaded from the environment.

use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use stagebill_projects::DEFAULT_DELIVERABLES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Defaults applied by the billing service.
///
/// | Env Var                      | Default              |
/// |------------------------------|----------------------|
/// | `INVOICE_NUMBER_PREFIX`      | `INV`                |
/// | `DEFAULT_PAYMENT_TERMS_DAYS` | `30`                 |
/// | `DEFAULT_TAX_RATE`           | `0`                  |
/// | `DEFAULT_DELIVERABLES`       | built-in checklist   |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingConfig {
    pub invoice_number_prefix: String,
    /// Days between issue and due date when creation omits a due date.
    pub default_payment_terms_days: u32,
    pub default_tax_rate: Decimal,
    pub default_deliverables: Vec<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            invoice_number_prefix: "INV".to_string(),
            default_payment_terms_days: 30,
            default_tax_rate: Decimal::ZERO,
            default_deliverables: DEFAULT_DELIVERABLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BillingConfig {
    /// Read `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let invoice_number_prefix = match lookup("INVOICE_NUMBER_PREFIX") {
            Some(raw) => {
                let prefix = raw.trim().to_string();
                if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(ConfigError::Invalid {
                        var: "INVOICE_NUMBER_PREFIX",
                        reason: format!("expected ASCII letters or digits, got {raw:?}"),
                    });
                }
                prefix
            }
            None => defaults.invoice_number_prefix,
        };

        let default_payment_terms_days = match lookup("DEFAULT_PAYMENT_TERMS_DAYS") {
            Some(raw) => parse("DEFAULT_PAYMENT_TERMS_DAYS", &raw)?,
            None => defaults.default_payment_terms_days,
        };

        let default_tax_rate = match lookup("DEFAULT_TAX_RATE") {
            Some(raw) => {
                let rate: Decimal = parse("DEFAULT_TAX_RATE", &raw)?;
                if rate < Decimal::ZERO {
                    return Err(ConfigError::Invalid {
                        var: "DEFAULT_TAX_RATE",
                        reason: "must not be negative".to_string(),
                    });
                }
                rate
            }
            None => defaults.default_tax_rate,
        };

        let default_deliverables = match lookup("DEFAULT_DELIVERABLES") {
            Some(raw) => {
                let names: Vec<String> = raw
                    .split(';')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if names.is_empty() {
                    return Err(ConfigError::Invalid {
                        var: "DEFAULT_DELIVERABLES",
                        reason: "expected at least one ';'-separated name".to_string(),
                    });
                }
                let mut seen = HashSet::new();
                if let Some(dup) = names.iter().find(|n| !seen.insert(n.to_lowercase())) {
                    return Err(ConfigError::Invalid {
                        var: "DEFAULT_DELIVERABLES",
                        reason: format!("duplicate name {dup:?} (names are compared ignoring case)"),
                    });
                }
                names
            }
            None => defaults.default_deliverables,
        };

        Ok(Self {
            invoice_number_prefix,
            default_payment_terms_days,
            default_tax_rate,
            default_deliverables,
        })
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}
