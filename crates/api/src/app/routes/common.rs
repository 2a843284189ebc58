use axum::http::StatusCode;

use stagebill_auth::{CommandAuthorization, Permission};

use crate::app::errors;
use crate::context::{PrincipalContext, TenantContext};

/// Associates the permissions an operation requires with its input.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Permission) -> Self {
        Self {
            inner,
            required: vec![required],
        }
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Authorize a mutating operation, mapping denial to `403`.
pub fn guard<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    cmd: &C,
) -> Result<(), axum::response::Response> {
    crate::authz::authorize_command(tenant, principal, cmd)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

/// Authorize a read, mapping denial to `403`.
pub fn guard_read(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), axum::response::Response> {
    crate::authz::authorize_permission(tenant, principal, required)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}
