use std::collections::HashSet;

use thiserror::Error;

use stagebill_core::{OrganizationId, UserId};

use crate::{JwtClaims, Permission, Role, role_permissions};

/// Roles and permissions a user holds inside one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantMembership {
    pub organization_id: OrganizationId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl TenantMembership {
    /// Expand roles into their permissions (duplicates removed, order kept).
    pub fn from_roles(organization_id: OrganizationId, roles: Vec<Role>) -> Self {
        let mut seen = HashSet::new();
        let permissions = roles
            .iter()
            .flat_map(role_permissions)
            .filter(|p| seen.insert(p.clone()))
            .collect();

        Self {
            organization_id,
            roles,
            permissions,
        }
    }
}

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: UserId,
    pub active_organization_id: OrganizationId,
    pub membership: TenantMembership,
}

impl Principal {
    /// Resolve a principal from verified token claims.
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            principal_id: claims.sub,
            active_organization_id: claims.organization_id,
            membership: TenantMembership::from_roles(claims.organization_id, claims.roles.clone()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("organization mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Operations that require permissions implement this; the API checks them
/// before running the operation.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal within its active organization. Pure policy check.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_organization_id != principal.membership.organization_id {
        return Err(AuthzError::TenantMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
