use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::client::BillingClient;
use crate::data_source::{BillingCallback, BillingDataSource};
use crate::models::*;
use crate::{Error, Result};

/// Clears the in-progress flag when the purchase call returns.
struct InProgress(Arc<AtomicBool>);

impl Drop for InProgress {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Awaitable facade over [`BillingDataSource`] for the application.
pub struct StoreBridge<C: BillingClient> {
    data_source: BillingDataSource<C>,
    in_progress: Arc<AtomicBool>,
}

impl<C: BillingClient> StoreBridge<C> {
    pub fn new(data_source: BillingDataSource<C>) -> Self {
        Self {
            data_source,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn data_source(&self) -> &BillingDataSource<C> {
        &self.data_source
    }

    pub fn purchase_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Runs a purchase flow for `product_id` and waits for its first outcome.
    ///
    /// `ItemAlreadyOwned` counts as success: the user holds the product.
    pub async fn purchase(
        &self,
        activity: C::Activity,
        product_id: String,
    ) -> Result<PurchaseResponse> {
        let catalog = self.data_source.catalog();
        if !catalog.is_valid(&product_id) {
            return Err(Error::UnknownProduct(product_id));
        }
        let is_consumable = catalog.is_consumable(&product_id);

        if self.in_progress.swap(true, Ordering::SeqCst) {
            return Err(Error::PurchaseInProgress);
        }
        let _guard = InProgress(self.in_progress.clone());

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let callback: BillingCallback = Arc::new(move |code, message| {
            let sender = tx.lock().ok().and_then(|mut slot| slot.take());
            match sender {
                Some(sender) => {
                    let _ = sender.send(BillingOutcome { code, message });
                }
                None => debug!("late purchase outcome ignored: {code:?} {message}"),
            }
        });

        self.data_source
            .launch_billing_flow(activity, product_id.clone(), is_consumable, callback);

        let outcome = rx.await.map_err(|_| Error::FlowAbandoned)?;
        let success = matches!(outcome.code, ResultCode::Ok | ResultCode::ItemAlreadyOwned);
        if !success {
            warn!("purchase of {product_id} failed: {:?} {}", outcome.code, outcome.message);
        }
        Ok(PurchaseResponse {
            product_id,
            success,
            code: outcome.code,
            message: outcome.message,
        })
    }

    /// Restores owned non-consumable products from the purchase history.
    pub async fn restore(&self, activity: C::Activity) -> Result<RestorePurchasesResponse> {
        let (callback, mut rx) = channel_callback();
        self.data_source.restore_previous_iaps(activity, callback);

        let mut response = RestorePurchasesResponse::default();
        while let Some(outcome) = rx.recv().await {
            match outcome.code {
                ResultCode::Ok => response.restored.push(outcome.message),
                ResultCode::RestoreCompleted => {
                    response.completed = true;
                    response.code = Some(outcome.code);
                    response.message = Some(outcome.message);
                    return Ok(response);
                }
                code => {
                    response.code = Some(code);
                    response.message = Some(outcome.message);
                    return Ok(response);
                }
            }
        }
        Err(Error::FlowAbandoned)
    }

    /// Finalizes purchases left unacknowledged by an earlier session and
    /// returns every outcome, the closing `RestoreCompleted` or `NoRestore`
    /// included.
    pub async fn acknowledge_pending(&self, activity: C::Activity) -> Result<Vec<BillingOutcome>> {
        let (callback, mut rx) = channel_callback();
        self.data_source.acknowledge_pending_purchases(activity, callback);

        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            let done = matches!(
                outcome.code,
                ResultCode::RestoreCompleted | ResultCode::NoRestore
            );
            outcomes.push(outcome);
            if done {
                return Ok(outcomes);
            }
        }
        Err(Error::FlowAbandoned)
    }

    pub fn product_details(&self, product_id: &str) -> Option<ProductDetails> {
        self.data_source.sku_details(product_id)
    }

    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState {
            connected: self.data_source.is_connected(),
            billing_flow_in_process: self.data_source.billing_flow_in_process(),
            sku_details_fresh: self.data_source.sku_details_fresh(),
        }
    }
}

fn channel_callback() -> (BillingCallback, mpsc::UnboundedReceiver<BillingOutcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: BillingCallback = Arc::new(move |code, message| {
        if tx.send(BillingOutcome { code, message }).is_err() {
            debug!("outcome dropped, nobody is waiting: {code:?}");
        }
    });
    (callback, rx)
}
