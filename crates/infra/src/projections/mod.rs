//! Projection implementations (read model builders).
//!
//! Projections are rebuildable from the event store, partitioned by
//! organization, and idempotent under at-least-once delivery.

pub mod invoice_directory;

pub use invoice_directory::{
    INVOICE_AGGREGATE_TYPE, InvoiceDirectoryProjection, InvoiceProjectionError,
};
