//! Infrastructure layer: event store, command dispatch, read models,
//! collaborators and the billing application service.

pub mod billing_service;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod mailer;
pub mod numbering;
pub mod projections;
pub mod read_model;
pub mod renderer;


pub use billing_service::{
    BillingError, BillingService, CHECKLIST_AGGREGATE_TYPE, EmailOutcome, NewInvoice, SendOutcome,
};
pub use config::{BillingConfig, ConfigError};
