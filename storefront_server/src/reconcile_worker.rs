use std::sync::Arc;

use chrono::Duration;
use log::*;
use settlement_engine::{
    settlement_objects::StaleVerification,
    traits::PaymentGateway,
    SettlementApi,
    SettlementDatabase,
};
use tokio::task::JoinHandle;

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, orders that have been awaiting verification for longer than `window` are looked up on the
/// gateway. The worker only reports; webhooks remain the only thing that moves an order to `PAID`.
pub fn start_reconcile_worker<B, G>(
    api: Arc<SettlementApi<B, G>>,
    window: Duration,
    interval: std::time::Duration,
) -> JoinHandle<()>
where
    B: SettlementDatabase + 'static,
    G: PaymentGateway + 'static,
{
    actix_web::rt::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Stale verification worker started. Window: {} min", window.num_minutes());
        loop {
            timer.tick().await;
            debug!("🕰️ Running stale verification job");
            match api.review_stale_verifications(window).await {
                Ok(stale) if stale.is_empty() => trace!("🕰️ No stale verifications"),
                Ok(stale) => {
                    let paid = stale.iter().filter(|s| s.remote_paid).count();
                    info!("🕰️ {} orders awaiting verification for too long. {paid} are paid on the gateway", stale.len());
                    debug!("🕰️ Stale verifications: {}", stale_list(&stale));
                },
                Err(e) => {
                    error!("🕰️ Error running stale verification job: {e}");
                },
            }
        }
    })
}

fn stale_list(stale: &[StaleVerification]) -> String {
    stale
        .iter()
        .map(|s| {
            format!(
                "[{}] gateway order: {} remote status: {}",
                s.order_id,
                s.gateway_order_id.as_deref().unwrap_or("none"),
                s.remote_status.as_deref().unwrap_or("unknown")
            )
        })
        .collect::<Vec<String>>()
        .join(", ")
}
