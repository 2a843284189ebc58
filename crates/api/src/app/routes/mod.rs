use axum::{Router, routing::get};

pub mod common;
pub mod invoices;
pub mod phases;
pub mod reports;
pub mod system;

/// Router for all authenticated (organization-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/phases", phases::router())
        .nest("/invoices", invoices::router())
        .nest("/reports", reports::router())
}
