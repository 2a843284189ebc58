//! Financial rollups over invoice snapshots.
//!
//! Every function here is a pure fold: inputs are borrowed, never modified,
//! and results are ordered by group key.

pub mod aggregator;
pub mod summary;

pub use aggregator::{by_charge_type, by_group, by_overall, by_phase, by_project, by_status};
pub use summary::{FinancialSummary, GroupSummary};
