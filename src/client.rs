//! Seam between the orchestration layer and the platform billing SDK.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::models::*;

/// Notifications the SDK pushes without being asked.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BillingEvent {
    /// The connection to the billing service was lost.
    ServiceDisconnected,
    /// New purchases (or a failed flow), usually after `launch_billing_flow`.
    #[serde(rename_all = "camelCase")]
    PurchasesUpdated {
        billing_result: BillingResult,
        purchases: Option<Vec<Purchase>>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuDetailsResult {
    pub billing_result: BillingResult,
    pub sku_details_list: Option<Vec<ProductDetails>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasesResult {
    pub billing_result: BillingResult,
    #[serde(default)]
    pub purchases_list: Vec<Purchase>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseHistoryResult {
    pub billing_result: BillingResult,
    pub purchase_history_record_list: Option<Vec<PurchaseHistoryRecord>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResult {
    pub billing_result: BillingResult,
    pub purchase_token: Option<String>,
}

/// The platform billing client. Only in-app (non-subscription) products are
/// queried.
///
/// Asynchronous notifications are delivered as [`BillingEvent`]s over the
/// channel handed to the implementation when it is created.
#[async_trait]
pub trait BillingClient: Send + Sync + 'static {
    /// Whatever the platform needs to host the purchase UI.
    type Activity: Clone + Send + Sync + 'static;

    /// `false` when there is no billing service to connect to at all, in
    /// which case setup is never attempted.
    fn is_available(&self) -> bool {
        true
    }

    /// Completes once setup finished, successfully or not.
    async fn start_connection(&self) -> BillingResult;

    async fn query_sku_details(&self, skus: Vec<String>) -> SkuDetailsResult;

    /// Shows the purchase UI. The purchase itself is reported later through
    /// [`BillingEvent::PurchasesUpdated`].
    async fn launch_billing_flow(
        &self,
        activity: &Self::Activity,
        details: &ProductDetails,
    ) -> BillingResult;

    async fn acknowledge_purchase(&self, purchase_token: &str) -> BillingResult;

    async fn consume_purchase(&self, purchase_token: &str) -> ConsumeResult;

    async fn query_purchases(&self) -> PurchasesResult;

    async fn query_purchase_history(&self) -> PurchaseHistoryResult;
}

/// Hands events produced by `poll` to `events` until the receiver is gone.
///
/// `poll` yields `Ok(None)` when the platform had nothing to report. That and
/// a failed poll both wait `idle_delay` before polling again.
#[cfg_attr(not(target_os = "android"), allow(dead_code))]
pub(crate) async fn forward_events<F, Fut, E>(
    mut poll: F,
    events: UnboundedSender<BillingEvent>,
    idle_delay: Duration,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<BillingEvent>, E>>,
    E: Display,
{
    loop {
        match poll().await {
            Ok(Some(event)) => {
                if events.send(event).is_err() {
                    debug!("billing event receiver dropped, stopping event bridge");
                    return;
                }
            }
            Ok(None) => tokio::time::sleep(idle_delay).await,
            Err(e) => {
                warn!("billing event bridge failed: {e}");
                tokio::time::sleep(idle_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use super::*;

    type Poll = Result<Option<BillingEvent>, String>;

    #[tokio::test(start_paused = true)]
    async fn empty_and_failed_polls_wait_before_polling_again() {
        let script: Arc<Mutex<VecDeque<Poll>>> = Arc::new(Mutex::new(VecDeque::from([
            Ok(None),
            Ok(None),
            Err("bridge down".to_string()),
            Ok(Some(BillingEvent::ServiceDisconnected)),
        ])));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let started = Instant::now();
        let task = {
            let script = script.clone();
            tokio::spawn(forward_events(
                move || {
                    let next = script
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(|| Err("script exhausted".to_string()));
                    async move { next }
                },
                tx,
                Duration::from_secs(1),
            ))
        };

        assert_eq!(rx.recv().await, Some(BillingEvent::ServiceDisconnected));
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3050),
            "elapsed {elapsed:?}"
        );
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_once_the_receiver_is_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        forward_events(
            || async { Ok::<_, String>(Some(BillingEvent::ServiceDisconnected)) },
            tx,
            Duration::from_secs(1),
        )
        .await;
    }
}
