use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tauri::{plugin::PluginApi, AppHandle, Runtime};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::client::*;
use crate::models::*;

const UNSUPPORTED: &str = "In-app billing is not supported on this platform";

pub fn init<R: Runtime, C: DeserializeOwned>(
    app: &AppHandle<R>,
    _api: PluginApi<R, C>,
    _events: UnboundedSender<BillingEvent>,
) -> crate::Result<PlatformBillingClient<R>> {
    Ok(PlatformBillingClient(app.clone()))
}

/// Billing client for platforms without a store: every call reports the
/// billing service as unavailable.
pub struct PlatformBillingClient<R: Runtime>(AppHandle<R>);

impl<R: Runtime> PlatformBillingClient<R> {
    fn unavailable(&self) -> BillingResult {
        BillingResult::new(BillingResponseCode::BillingUnavailable, UNSUPPORTED)
    }
}

#[async_trait]
impl<R: Runtime> BillingClient for PlatformBillingClient<R> {
    type Activity = String;

    fn is_available(&self) -> bool {
        false
    }

    async fn start_connection(&self) -> BillingResult {
        debug!(
            "{} has no billing service to connect to",
            self.0.package_info().name
        );
        self.unavailable()
    }

    async fn query_sku_details(&self, _skus: Vec<String>) -> SkuDetailsResult {
        SkuDetailsResult {
            billing_result: self.unavailable(),
            sku_details_list: None,
        }
    }

    async fn launch_billing_flow(
        &self,
        _activity: &String,
        _details: &ProductDetails,
    ) -> BillingResult {
        self.unavailable()
    }

    async fn acknowledge_purchase(&self, _purchase_token: &str) -> BillingResult {
        self.unavailable()
    }

    async fn consume_purchase(&self, _purchase_token: &str) -> ConsumeResult {
        ConsumeResult {
            billing_result: self.unavailable(),
            purchase_token: None,
        }
    }

    async fn query_purchases(&self) -> PurchasesResult {
        PurchasesResult {
            billing_result: self.unavailable(),
            purchases_list: Vec::new(),
        }
    }

    async fn query_purchase_history(&self) -> PurchaseHistoryResult {
        PurchaseHistoryResult {
            billing_result: self.unavailable(),
            purchase_history_record_list: None,
        }
    }
}
