//! Orchestration over the platform billing client: connection upkeep,
//! product details, purchase flows, finalization and restore.
//!
//! All entry points spawn onto the current Tokio runtime and report through
//! callbacks. Only one purchase flow and one restore are expected to be in
//! flight at a time; starting another replaces the stored callback.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::catalog::ProductCatalog;
use crate::client::{BillingClient, BillingEvent, SkuDetailsResult};
use crate::connection::ReconnectBackoff;
use crate::models::*;

/// How long cached product details are considered fresh.
pub const SKU_DETAILS_REQUERY_TIME: Duration = Duration::from_secs(4 * 60 * 60);

const DEVELOPER_ERROR_HINT: &str = "Developer error means that the store does not recognize \
    the configuration. Make sure the application is configured correctly in the store console, \
    the product id matches and the build is signed with release keys.";

/// Receives a result code and a human readable message.
pub type BillingCallback = Arc<dyn Fn(ResultCode, String) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Purchase,
    Pending,
    Restore,
}

impl Reply {
    fn for_flow(was_pending: bool) -> Self {
        if was_pending {
            Reply::Pending
        } else {
            Reply::Purchase
        }
    }
}

struct FlowState<A> {
    activity: Option<A>,
    active_sku: Option<String>,
    is_consumable: bool,
    skus: Vec<String>,
    callback: Option<BillingCallback>,
    pending_callback: Option<BillingCallback>,
    restore_callback: Option<BillingCallback>,
}

impl<A> Default for FlowState<A> {
    fn default() -> Self {
        Self {
            activity: None,
            active_sku: None,
            is_consumable: false,
            skus: Vec::new(),
            callback: None,
            pending_callback: None,
            restore_callback: None,
        }
    }
}

#[derive(Default)]
struct SkuCache {
    details: Option<Vec<ProductDetails>>,
    response_time: Option<Instant>,
}

struct Inner<C: BillingClient> {
    client: C,
    catalog: ProductCatalog,
    flow: Mutex<FlowState<C::Activity>>,
    cache: Mutex<SkuCache>,
    consumption_in_process: Mutex<HashSet<String>>,
    backoff: Mutex<ReconnectBackoff>,
    connected: AtomicBool,
    reconnecting: AtomicBool,
    billing_flow_in_process: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single orchestration object in front of a [`BillingClient`].
pub struct BillingDataSource<C: BillingClient> {
    inner: Arc<Inner<C>>,
}

impl<C: BillingClient> Clone for BillingDataSource<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: BillingClient> BillingDataSource<C> {
    pub fn new(client: C, catalog: ProductCatalog, backoff: ReconnectBackoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                catalog,
                flow: Mutex::new(FlowState::default()),
                cache: Mutex::new(SkuCache::default()),
                consumption_in_process: Mutex::new(HashSet::new()),
                backoff: Mutex::new(backoff),
                connected: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                billing_flow_in_process: AtomicBool::new(false),
            }),
        }
    }

    pub fn client(&self) -> &C {
        &self.inner.client
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.inner.catalog
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn billing_flow_in_process(&self) -> bool {
        self.inner.billing_flow_in_process.load(Ordering::SeqCst)
    }

    pub fn current_backoff(&self) -> Duration {
        lock(&self.inner.backoff).current()
    }

    /// Connects and then handles SDK events until the channel closes.
    pub async fn run(&self, mut events: UnboundedReceiver<BillingEvent>) {
        self.inner.reconnecting.store(true, Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move { this.connect().await });

        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("billing event channel closed");
    }

    /// Starts the connection, retrying with exponential backoff until the
    /// service accepts it. Returns at once when the client has no billing
    /// service to reach.
    pub async fn connect(&self) {
        if !self.inner.client.is_available() {
            info!("no billing service on this platform, not connecting");
            self.inner.reconnecting.store(false, Ordering::SeqCst);
            return;
        }
        loop {
            let result = self.inner.client.start_connection().await;
            debug!(
                "billing setup finished: {} {}",
                result.response_code.code(),
                result.debug_message
            );
            if result.is_ok() {
                lock(&self.inner.backoff).reset();
                self.inner.connected.store(true, Ordering::SeqCst);
                self.inner.reconnecting.store(false, Ordering::SeqCst);
                info!("connected to billing service");
                return;
            }
            let delay = lock(&self.inner.backoff).next_delay();
            debug!("billing setup failed, retrying in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }

    pub fn handle_event(&self, event: BillingEvent) {
        match event {
            BillingEvent::ServiceDisconnected => self.on_service_disconnected(),
            BillingEvent::PurchasesUpdated {
                billing_result,
                purchases,
            } => self.on_purchases_updated(billing_result, purchases),
        }
    }

    fn on_service_disconnected(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("billing service disconnected, reconnect already scheduled");
            return;
        }
        let delay = lock(&self.inner.backoff).next_delay();
        warn!("billing service disconnected, reconnecting in {delay:?}");
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.connect().await;
        });
    }

    pub fn sku_details(&self, sku: &str) -> Option<ProductDetails> {
        lock(&self.inner.cache)
            .details
            .as_ref()?
            .iter()
            .find(|d| d.sku == sku)
            .cloned()
    }

    pub fn sku_title(&self, sku: &str) -> Option<String> {
        self.sku_details(sku).map(|d| d.title)
    }

    pub fn sku_price(&self, sku: &str) -> Option<String> {
        self.sku_details(sku).map(|d| d.price)
    }

    pub fn sku_description(&self, sku: &str) -> Option<String> {
        self.sku_details(sku).map(|d| d.description)
    }

    /// Whether the last successful details response is inside the requery
    /// window. Informational only, the cache is never invalidated by it.
    pub fn sku_details_fresh(&self) -> bool {
        lock(&self.inner.cache)
            .response_time
            .is_some_and(|at| at.elapsed() < SKU_DETAILS_REQUERY_TIME)
    }

    fn callback(&self, reply: Reply) -> Option<BillingCallback> {
        let flow = lock(&self.inner.flow);
        match reply {
            Reply::Purchase => flow.callback.clone(),
            Reply::Pending => flow.pending_callback.clone(),
            Reply::Restore => flow.restore_callback.clone(),
        }
    }

    fn report(&self, reply: Reply, code: ResultCode, message: impl Into<String>) {
        let message = message.into();
        match self.callback(reply) {
            Some(callback) => callback(code, message),
            None => warn!("no {reply:?} callback registered for {code:?}: {message}"),
        }
    }

    /// Looks up details for `sku` and launches the platform purchase UI.
    ///
    /// The outcome is reported to `callback`, possibly much later once the
    /// SDK publishes the purchase.
    pub fn launch_billing_flow(
        &self,
        activity: C::Activity,
        sku: impl Into<String>,
        is_consumable: bool,
        callback: BillingCallback,
    ) {
        let sku = sku.into();
        {
            let mut flow = lock(&self.inner.flow);
            flow.callback = Some(callback);
            flow.activity = Some(activity);
            flow.active_sku = Some(sku.clone());
            flow.is_consumable = is_consumable;
            flow.skus = vec![sku];
        }

        let this = self.clone();
        tokio::spawn(async move { this.query_sku_details().await });
    }

    async fn query_sku_details(&self) {
        let skus = lock(&self.inner.flow).skus.clone();
        if skus.is_empty() {
            self.report(Reply::Purchase, ResultCode::Error, "No IAP SKU provided.");
            return;
        }
        let result = self.inner.client.query_sku_details(skus).await;
        self.on_sku_details_response(result).await;
    }

    async fn on_sku_details_response(&self, result: SkuDetailsResult) {
        let code = result.billing_result.response_code;
        let debug_message = &result.billing_result.debug_message;

        if code != BillingResponseCode::Ok {
            let message = format!("sku details query failed: {} {debug_message}", code.code());
            match ResultCode::from_response(code) {
                Some(ResultCode::UserCanceled) => {
                    info!("{message}");
                    self.report(Reply::Purchase, ResultCode::UserCanceled, message);
                }
                Some(result_code) => {
                    error!("{message}");
                    self.report(Reply::Purchase, result_code, message);
                }
                None => {
                    warn!("{message}");
                    self.report(Reply::Purchase, ResultCode::Error, message);
                }
            }
            return;
        }

        info!("sku details received: {debug_message}");
        {
            let mut cache = lock(&self.inner.cache);
            match result.sku_details_list {
                Some(list) if !list.is_empty() => cache.details = Some(list),
                _ => error!(
                    "found null or empty sku details, check that the requested skus are \
                     published in the store console"
                ),
            }
            cache.response_time = Some(Instant::now());
        }

        self.process_sku_details().await;
    }

    async fn process_sku_details(&self) {
        let (active_sku, activity) = {
            let flow = lock(&self.inner.flow);
            (flow.active_sku.clone(), flow.activity.clone())
        };
        let Some(sku) = active_sku else {
            error!("no active sku to launch a billing flow for");
            return;
        };
        let Some(details) = self.sku_details(&sku) else {
            error!("sku details not found for: {sku}");
            self.report(
                Reply::Purchase,
                ResultCode::ItemUnavailable,
                format!("Product details not found for: {sku}"),
            );
            return;
        };
        let Some(activity) = activity else {
            self.report(
                Reply::Purchase,
                ResultCode::Error,
                "No activity available to host the billing flow.",
            );
            return;
        };

        let result = self.inner.client.launch_billing_flow(&activity, &details).await;
        if result.is_ok() {
            self.inner.billing_flow_in_process.store(true, Ordering::SeqCst);
        } else {
            error!("billing failed: {}", result.debug_message);
            self.report(
                Reply::Purchase,
                ResultCode::from_failure(result.response_code),
                format!("Billing failed: {}", result.debug_message),
            );
        }
    }

    fn on_purchases_updated(&self, billing_result: BillingResult, purchases: Option<Vec<Purchase>>) {
        let is_consumable = lock(&self.inner.flow).is_consumable;
        match billing_result.response_code {
            BillingResponseCode::Ok => match purchases {
                Some(list) => self.process_purchase_list(list, is_consumable),
                None => {
                    debug!("null purchase list returned from OK response");
                    self.report(
                        Reply::Purchase,
                        ResultCode::Error,
                        "Null purchase list returned from OK response!",
                    );
                }
            },
            BillingResponseCode::UserCanceled => {
                info!("user canceled the purchase");
                self.report(
                    Reply::Purchase,
                    ResultCode::UserCanceled,
                    "User has cancelled the purchase.",
                );
            }
            BillingResponseCode::ItemAlreadyOwned => {
                info!("the user already owns this item");
                match purchases {
                    Some(list) if is_consumable && !list.is_empty() => {
                        for purchase in list {
                            let this = self.clone();
                            tokio::spawn(async move { this.consume_purchase(purchase, false).await });
                        }
                    }
                    _ if is_consumable => self.report(
                        Reply::Purchase,
                        ResultCode::ItemAlreadyOwned,
                        "Already owned, but no purchase was returned to consume.",
                    ),
                    _ => self.report(Reply::Purchase, ResultCode::Ok, "Already owned. Restore"),
                }
            }
            BillingResponseCode::DeveloperError => {
                error!("{DEVELOPER_ERROR_HINT}");
                self.report(Reply::Purchase, ResultCode::DeveloperError, DEVELOPER_ERROR_HINT);
            }
            code => {
                let message = format!(
                    "BillingResult [{}]: {}",
                    code.code(),
                    billing_result.debug_message
                );
                debug!("{message}");
                self.report(Reply::Purchase, ResultCode::Error, message);
            }
        }
        self.inner.billing_flow_in_process.store(false, Ordering::SeqCst);
    }

    fn process_purchase_list(&self, purchases: Vec<Purchase>, is_consumable: bool) {
        let mut scheduled = 0;
        let mut pending = 0;
        let mut owned = 0;
        for purchase in purchases {
            match purchase.purchase_state {
                PurchaseStateValue::Purchased if !purchase.is_acknowledged => {
                    scheduled += 1;
                    let this = self.clone();
                    if is_consumable {
                        tokio::spawn(async move { this.consume_purchase(purchase, false).await });
                    } else {
                        tokio::spawn(async move {
                            this.process_non_consumable_purchase(purchase, false).await
                        });
                    }
                }
                PurchaseStateValue::Purchased => owned += 1,
                PurchaseStateValue::Pending => pending += 1,
                PurchaseStateValue::Canceled => {}
            }
        }

        if scheduled == 0 && owned > 0 {
            debug!("purchase already acknowledged, nothing to finalize");
            self.report(Reply::Purchase, ResultCode::ItemAlreadyOwned, "Already owned.");
        } else if scheduled == 0 {
            let message = if pending > 0 {
                "Purchase is pending and will be finalized once approved."
            } else {
                "No completed purchase to finalize."
            };
            debug!("{message}");
            self.report(Reply::Purchase, ResultCode::Error, message);
        }
    }

    fn success_message(purchase: &Purchase, was_pending: bool) -> String {
        match purchase.product_id() {
            Some(product_id) if was_pending => product_id,
            _ => "Purchase successful.".to_string(),
        }
    }

    async fn process_non_consumable_purchase(&self, purchase: Purchase, was_pending: bool) {
        let reply = Reply::for_flow(was_pending);
        let result = self
            .inner
            .client
            .acknowledge_purchase(&purchase.purchase_token)
            .await;
        if result.is_ok() {
            self.report(reply, ResultCode::Ok, Self::success_message(&purchase, was_pending));
        } else {
            let message = format!("Error acknowledging purchase: {:?}", purchase.skus);
            error!("{message}: {}", result.debug_message);
            self.report(reply, ResultCode::Error, message);
        }
    }

    /// Consumes `purchase` unless a consumption of the same token is already
    /// running.
    async fn consume_purchase(&self, purchase: Purchase, was_pending: bool) {
        let reply = Reply::for_flow(was_pending);
        let token = purchase.purchase_token.clone();
        if !lock(&self.inner.consumption_in_process).insert(token.clone()) {
            self.report(reply, ResultCode::Error, "Already consuming the product.");
            return;
        }

        let result = self.inner.client.consume_purchase(&token).await;
        lock(&self.inner.consumption_in_process).remove(&token);

        if result.billing_result.is_ok() {
            debug!("consumption successful for {:?}", purchase.skus);
            self.report(reply, ResultCode::Ok, Self::success_message(&purchase, was_pending));
        } else {
            error!("error while consuming: {}", result.billing_result.debug_message);
            self.report(reply, ResultCode::Error, "Purchase was not successful.");
        }
    }

    pub fn is_consuming(&self, purchase_token: &str) -> bool {
        lock(&self.inner.consumption_in_process).contains(purchase_token)
    }

    /// Finalizes purchases completed outside a live flow (app killed during
    /// checkout, pending payments that went through).
    ///
    /// Each finalized purchase is reported as `Ok` with its product id; the
    /// run ends with `RestoreCompleted`, or `NoRestore` when purchases could
    /// not be queried.
    pub fn acknowledge_pending_purchases(&self, activity: C::Activity, callback: BillingCallback) {
        {
            let mut flow = lock(&self.inner.flow);
            flow.activity = Some(activity);
            flow.pending_callback = Some(callback);
        }

        let this = self.clone();
        tokio::spawn(async move { this.reconcile_pending_purchases().await });
    }

    async fn reconcile_pending_purchases(&self) {
        let result = self.inner.client.query_purchases().await;
        if !result.billing_result.is_ok() {
            let message = format!(
                "Unable to query purchases: {} {}",
                result.billing_result.response_code.code(),
                result.billing_result.debug_message
            );
            warn!("{message}");
            self.report(Reply::Pending, ResultCode::NoRestore, message);
            return;
        }

        for purchase in result.purchases_list {
            if purchase.is_acknowledged || purchase.purchase_state != PurchaseStateValue::Purchased {
                continue;
            }
            let Some(product_id) = purchase.product_id() else {
                continue;
            };
            if !self.inner.catalog.is_valid(&product_id) {
                debug!("skipping purchase of unknown product {product_id}");
                continue;
            }
            if self.inner.catalog.is_consumable(&product_id) {
                self.consume_purchase(purchase, true).await;
            } else {
                self.process_non_consumable_purchase(purchase, true).await;
            }
        }

        self.report(
            Reply::Pending,
            ResultCode::RestoreCompleted,
            "All pending purchases have been acknowledged.",
        );
    }

    /// Reports every owned non-consumable product from the purchase history.
    ///
    /// Each product is reported as `Ok` with its id, followed by
    /// `RestoreCompleted`; `NoRestore` when there is nothing to restore.
    pub fn restore_previous_iaps(&self, activity: C::Activity, callback: BillingCallback) {
        {
            let mut flow = lock(&self.inner.flow);
            flow.activity = Some(activity);
            flow.restore_callback = Some(callback);
        }

        let this = self.clone();
        tokio::spawn(async move { this.restore().await });
    }

    async fn restore(&self) {
        let result = self.inner.client.query_purchase_history().await;
        if !result.billing_result.is_ok() {
            let code = result.billing_result.response_code;
            warn!("purchase history query failed: {}", code.code());
            self.report(
                Reply::Restore,
                ResultCode::from_failure(code),
                result.billing_result.debug_message,
            );
            return;
        }

        match result.purchase_history_record_list {
            Some(records) if !records.is_empty() => self.process_restored_purchases(records),
            _ => {
                debug!("nothing to restore");
                self.report(
                    Reply::Restore,
                    ResultCode::NoRestore,
                    "No purchase history found. Skipping Restore",
                );
            }
        }
    }

    fn process_restored_purchases(&self, records: Vec<PurchaseHistoryRecord>) {
        if self.inner.catalog.is_empty() {
            debug!("no saved in-app info, can't restore");
            self.report(
                Reply::Restore,
                ResultCode::NoRestore,
                "No saved In-app info. Skipping restore.",
            );
            return;
        }

        for record in records {
            let Some(product_id) = record.product_id() else {
                continue;
            };
            if self.inner.catalog.is_valid(&product_id)
                && !self.inner.catalog.is_consumable(&product_id)
            {
                self.report(Reply::Restore, ResultCode::Ok, product_id);
            }
        }
        self.report(
            Reply::Restore,
            ResultCode::RestoreCompleted,
            "All products have been restored",
        );
    }
}
