use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tauri::{
    plugin::{PluginApi, PluginHandle},
    AppHandle, Runtime,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::client::*;
use crate::models::*;

const PLUGIN_IDENTIFIER: &str = "app.tauri.billing";

/// Pause before polling again after `nextEvent` came back empty or failed.
const EVENT_IDLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SkuDetailsArgs {
    sku_list: Vec<String>,
    sku_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LaunchBillingFlowArgs<'a> {
    window_label: &'a str,
    sku: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseTokenArgs<'a> {
    purchase_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SkuTypeArgs {
    sku_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextEvent {
    event: Option<BillingEvent>,
}

// initializes the Kotlin plugin class and starts forwarding its events
pub fn init<R: Runtime, C: DeserializeOwned>(
    _app: &AppHandle<R>,
    api: PluginApi<R, C>,
    events: UnboundedSender<BillingEvent>,
) -> crate::Result<PlatformBillingClient<R>> {
    let handle = api.register_android_plugin(PLUGIN_IDENTIFIER, "BillingPlugin")?;
    let poller = handle.clone();
    // long-polls the Kotlin side for SDK listener callbacks
    // (`onPurchasesUpdated`, `onBillingServiceDisconnected`)
    let poll = move || {
        let handle = poller.clone();
        async move {
            let next: Result<NextEvent, _> = handle.run_mobile_plugin_async("nextEvent", ()).await;
            next.map(|next| next.event)
        }
    };
    tauri::async_runtime::spawn(forward_events(poll, events, EVENT_IDLE_DELAY));
    Ok(PlatformBillingClient(handle))
}

/// Billing client backed by the Play Billing library through the Kotlin plugin.
pub struct PlatformBillingClient<R: Runtime>(PluginHandle<R>);

impl<R: Runtime> PlatformBillingClient<R> {
    async fn invoke<T: DeserializeOwned>(
        &self,
        command: &str,
        payload: impl Serialize,
    ) -> crate::Result<T> {
        self.0
            .run_mobile_plugin_async(command, payload)
            .await
            .map_err(Into::into)
    }

    fn failed(command: &str, error: crate::Error) -> BillingResult {
        warn!("{command} failed: {error}");
        BillingResult::new(BillingResponseCode::Error, error.to_string())
    }
}

#[async_trait]
impl<R: Runtime> BillingClient for PlatformBillingClient<R> {
    /// Label of the webview window hosting the purchase UI.
    type Activity = String;

    async fn start_connection(&self) -> BillingResult {
        self.invoke("startConnection", ())
            .await
            .unwrap_or_else(|e| Self::failed("startConnection", e))
    }

    async fn query_sku_details(&self, skus: Vec<String>) -> SkuDetailsResult {
        let args = SkuDetailsArgs {
            sku_list: skus,
            sku_type: "inapp",
        };
        self.invoke("querySkuDetails", args)
            .await
            .unwrap_or_else(|e| SkuDetailsResult {
                billing_result: Self::failed("querySkuDetails", e),
                sku_details_list: None,
            })
    }

    async fn launch_billing_flow(&self, activity: &String, details: &ProductDetails) -> BillingResult {
        let args = LaunchBillingFlowArgs {
            window_label: activity,
            sku: &details.sku,
        };
        self.invoke("launchBillingFlow", args)
            .await
            .unwrap_or_else(|e| Self::failed("launchBillingFlow", e))
    }

    async fn acknowledge_purchase(&self, purchase_token: &str) -> BillingResult {
        self.invoke("acknowledgePurchase", PurchaseTokenArgs { purchase_token })
            .await
            .unwrap_or_else(|e| Self::failed("acknowledgePurchase", e))
    }

    async fn consume_purchase(&self, purchase_token: &str) -> ConsumeResult {
        self.invoke("consumePurchase", PurchaseTokenArgs { purchase_token })
            .await
            .unwrap_or_else(|e| ConsumeResult {
                billing_result: Self::failed("consumePurchase", e),
                purchase_token: None,
            })
    }

    async fn query_purchases(&self) -> PurchasesResult {
        self.invoke("queryPurchases", SkuTypeArgs { sku_type: "inapp" })
            .await
            .unwrap_or_else(|e| PurchasesResult {
                billing_result: Self::failed("queryPurchases", e),
                purchases_list: Vec::new(),
            })
    }

    async fn query_purchase_history(&self) -> PurchaseHistoryResult {
        self.invoke("queryPurchaseHistory", SkuTypeArgs { sku_type: "inapp" })
            .await
            .unwrap_or_else(|e| PurchaseHistoryResult {
                billing_result: Self::failed("queryPurchaseHistory", e),
                purchase_history_record_list: None,
            })
    }
}
