use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC. Unknown roles grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

const READS: [Permission; 3] = [
    Permission::PHASES_READ,
    Permission::INVOICES_READ,
    Permission::REPORTS_READ,
];

/// Permissions granted by a role.
///
/// | Role         | Grants                                      |
/// |--------------|---------------------------------------------|
/// | `admin`      | `*`                                         |
/// | `accountant` | every invoice and report permission, reads  |
/// | `manager`    | phase permissions, reads                    |
/// | `viewer`     | reads                                       |
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::ALL],
        "accountant" => {
            let mut perms = READS.to_vec();
            perms.extend([
                Permission::INVOICES_CREATE,
                Permission::INVOICES_EDIT,
                Permission::INVOICES_SEND,
                Permission::INVOICES_PAY,
                Permission::INVOICES_CANCEL,
                Permission::INVOICES_SWEEP,
            ]);
            perms
        }
        "manager" => {
            let mut perms = READS.to_vec();
            perms.push(Permission::PHASES_WRITE);
            perms
        }
        "viewer" => READS.to_vec(),
        _ => Vec::new(),
    }
}
