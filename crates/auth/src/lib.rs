//! `stagebill-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: token verification, claims, and the
//! role → permission policy used before any billing operation runs.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, TenantMembership, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use roles::{Role, role_permissions};
