//! API-side authorization guard.
//!
//! Permissions are checked here, before the billing service is called; the
//! domain and infra crates stay auth-agnostic.

use stagebill_auth::{AuthzError, CommandAuthorization, Permission, Principal, TenantMembership, authorize};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for an operation in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = resolve(tenant, principal);
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Check a single permission (read routes).
pub fn authorize_permission(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), AuthzError> {
    authorize(&resolve(tenant, principal), required)
}

fn resolve(tenant: &TenantContext, principal: &PrincipalContext) -> Principal {
    Principal {
        principal_id: principal.principal_id(),
        active_organization_id: tenant.organization_id(),
        membership: TenantMembership::from_roles(tenant.organization_id(), principal.roles().to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagebill_auth::Role;
    use stagebill_core::{OrganizationId, UserId};

    struct Pay;

    impl CommandAuthorization for Pay {
        fn required_permissions(&self) -> &[Permission] {
            static REQUIRED: [Permission; 1] = [Permission::INVOICES_PAY];
            &REQUIRED
        }
    }

    fn ctx(role: &'static str) -> (TenantContext, PrincipalContext) {
        (
            TenantContext::new(OrganizationId::new()),
            PrincipalContext::new(UserId::new(), vec![Role::new(role)]),
        )
    }

    #[test]
    fn accountants_may_record_payments() {
        let (tenant, principal) = ctx("accountant");
        assert!(authorize_command(&tenant, &principal, &Pay).is_ok());
    }

    #[test]
    fn managers_may_not_record_payments() {
        let (tenant, principal) = ctx("manager");
        assert!(matches!(
            authorize_command(&tenant, &principal, &Pay),
            Err(AuthzError::Forbidden(_))
        ));
        assert!(authorize_permission(&tenant, &principal, &Permission::PHASES_WRITE).is_ok());
    }
}
