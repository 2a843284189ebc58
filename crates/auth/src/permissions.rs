use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. `"invoices.send"`).
///
/// The wildcard `"*"` grants everything within the organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission::named("*");

    pub const PHASES_READ: Permission = Permission::named("phases.read");
    pub const PHASES_WRITE: Permission = Permission::named("phases.write");

    pub const INVOICES_READ: Permission = Permission::named("invoices.read");
    pub const INVOICES_CREATE: Permission = Permission::named("invoices.create");
    pub const INVOICES_EDIT: Permission = Permission::named("invoices.edit");
    pub const INVOICES_SEND: Permission = Permission::named("invoices.send");
    pub const INVOICES_PAY: Permission = Permission::named("invoices.pay");
    pub const INVOICES_CANCEL: Permission = Permission::named("invoices.cancel");
    pub const INVOICES_SWEEP: Permission = Permission::named("invoices.sweep");

    pub const REPORTS_READ: Permission = Permission::named("reports.read");

    const fn named(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
