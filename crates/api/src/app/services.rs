use std::sync::Arc;
use std::time::Duration;

use stagebill_infra::{BillingConfig, BillingService};

/// In-memory billing wiring (event store, bus, directory, log mailer).
pub fn build_services(config: BillingConfig) -> BillingService {
    BillingService::new(config)
}

/// Run the overdue sweep for every known organization on a fixed interval.
pub fn spawn_overdue_sweeper(
    billing: Arc<BillingService>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let billing = billing.clone();
            match tokio::task::spawn_blocking(move || billing.sweep_every_organization()).await {
                Ok(0) => tracing::debug!("overdue sweep: nothing to do"),
                Ok(moved) => tracing::info!(moved, "overdue sweep finished"),
                Err(e) => tracing::warn!(error = %e, "overdue sweep task failed"),
            }
        }
    })
}
