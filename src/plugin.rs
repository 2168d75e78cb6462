use tauri::{AppHandle, Emitter, Runtime};
use tracing::warn;

use crate::bridge::StoreBridge;
use crate::models::*;
use crate::PlatformBillingClient;

/// Emitted once per purchase finalized by `acknowledge_pending_purchases`.
pub const PENDING_PURCHASE_EVENT: &str = "billing://pending-purchase";
/// Emitted once per product restored by `restore_purchases`.
pub const RESTORED_EVENT: &str = "billing://restored";

/// Access to the billing APIs.
pub struct Billing<R: Runtime> {
    app_handle: AppHandle<R>,
    bridge: StoreBridge<PlatformBillingClient<R>>,
}

impl<R: Runtime> Billing<R> {
    pub(crate) fn new(app_handle: AppHandle<R>, bridge: StoreBridge<PlatformBillingClient<R>>) -> Self {
        Self { app_handle, bridge }
    }

    pub fn bridge(&self) -> &StoreBridge<PlatformBillingClient<R>> {
        &self.bridge
    }

    fn emit<S: serde::Serialize + Clone>(&self, event: &str, payload: S) {
        if let Err(e) = self.app_handle.emit(event, payload) {
            warn!("failed to emit {event}: {e}");
        }
    }

    pub async fn purchase(&self, window_label: String, product_id: String) -> crate::Result<PurchaseResponse> {
        self.bridge.purchase(window_label, product_id).await
    }

    pub async fn restore_purchases(&self, window_label: String) -> crate::Result<RestorePurchasesResponse> {
        let response = self.bridge.restore(window_label).await?;
        for product_id in &response.restored {
            self.emit(RESTORED_EVENT, product_id.clone());
        }
        Ok(response)
    }

    pub async fn acknowledge_pending_purchases(&self, window_label: String) -> crate::Result<Vec<BillingOutcome>> {
        let outcomes = self.bridge.acknowledge_pending(window_label).await?;
        for outcome in outcomes.iter().filter(|o| o.code == ResultCode::Ok) {
            self.emit(PENDING_PURCHASE_EVENT, outcome.clone());
        }
        Ok(outcomes)
    }

    pub fn get_product_details(&self, product_id: &str) -> Option<ProductDetails> {
        self.bridge.product_details(product_id)
    }

    pub fn get_connection_state(&self) -> ConnectionState {
        self.bridge.connection_state()
    }
}
