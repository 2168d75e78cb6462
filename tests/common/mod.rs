//! Scripted stand-in for the platform billing SDK.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tauri_plugin_billing::client::*;
use tauri_plugin_billing::*;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Launch { activity: String, sku: String },
    Acknowledge(String),
    Consume(String),
}

pub struct FakeClient {
    events: UnboundedSender<BillingEvent>,
    pub connection_results: Mutex<VecDeque<BillingResponseCode>>,
    pub connect_attempts: AtomicUsize,
    pub available: AtomicBool,
    pub sku_details: Mutex<SkuDetailsResult>,
    pub launch_result: Mutex<BillingResult>,
    pub on_launch: Mutex<Option<BillingEvent>>,
    pub acknowledge_code: Mutex<BillingResponseCode>,
    pub consume_code: Mutex<BillingResponseCode>,
    pub consume_gate: Mutex<Option<Arc<Notify>>>,
    pub purchases: Mutex<PurchasesResult>,
    pub history: Mutex<PurchaseHistoryResult>,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeClient {
    pub fn new(events: UnboundedSender<BillingEvent>) -> Self {
        Self {
            events,
            connection_results: Mutex::new(VecDeque::new()),
            connect_attempts: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            sku_details: Mutex::new(SkuDetailsResult {
                billing_result: BillingResult::ok(),
                sku_details_list: Some(vec![details("coins"), details("remove_ads")]),
            }),
            launch_result: Mutex::new(BillingResult::ok()),
            on_launch: Mutex::new(None),
            acknowledge_code: Mutex::new(BillingResponseCode::Ok),
            consume_code: Mutex::new(BillingResponseCode::Ok),
            consume_gate: Mutex::new(None),
            purchases: Mutex::new(PurchasesResult {
                billing_result: BillingResult::ok(),
                purchases_list: Vec::new(),
            }),
            history: Mutex::new(PurchaseHistoryResult {
                billing_result: BillingResult::ok(),
                purchase_history_record_list: None,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script_connections(&self, codes: impl IntoIterator<Item = BillingResponseCode>) {
        self.connection_results.lock().unwrap().extend(codes);
    }

    pub fn launch_then(&self, event: BillingEvent) {
        *self.on_launch.lock().unwrap() = Some(event);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BillingClient for FakeClient {
    type Activity = String;

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn start_connection(&self) -> BillingResult {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let code = self
            .connection_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BillingResponseCode::Ok);
        BillingResult::new(code, "scripted")
    }

    async fn query_sku_details(&self, skus: Vec<String>) -> SkuDetailsResult {
        let mut result = self.sku_details.lock().unwrap().clone();
        if let Some(list) = result.sku_details_list.as_mut() {
            list.retain(|d| skus.contains(&d.sku));
        }
        result
    }

    async fn launch_billing_flow(&self, activity: &String, details: &ProductDetails) -> BillingResult {
        self.record(Call::Launch {
            activity: activity.clone(),
            sku: details.sku.clone(),
        });
        let result = self.launch_result.lock().unwrap().clone();
        if let Some(event) = self.on_launch.lock().unwrap().take() {
            let _ = self.events.send(event);
        }
        result
    }

    async fn acknowledge_purchase(&self, purchase_token: &str) -> BillingResult {
        self.record(Call::Acknowledge(purchase_token.to_string()));
        BillingResult::new(*self.acknowledge_code.lock().unwrap(), "")
    }

    async fn consume_purchase(&self, purchase_token: &str) -> ConsumeResult {
        self.record(Call::Consume(purchase_token.to_string()));
        let gate = self.consume_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        ConsumeResult {
            billing_result: BillingResult::new(*self.consume_code.lock().unwrap(), ""),
            purchase_token: Some(purchase_token.to_string()),
        }
    }

    async fn query_purchases(&self) -> PurchasesResult {
        self.purchases.lock().unwrap().clone()
    }

    async fn query_purchase_history(&self) -> PurchaseHistoryResult {
        self.history.lock().unwrap().clone()
    }
}

pub fn catalog() -> ProductCatalog {
    ProductCatalog::new([
        CatalogEntry::new("coins", ProductKind::Consumable),
        CatalogEntry::new("remove_ads", ProductKind::NonConsumable),
        CatalogEntry::new("premium_theme", ProductKind::NonConsumable),
    ])
}

pub fn details(sku: &str) -> ProductDetails {
    ProductDetails {
        sku: sku.to_string(),
        title: format!("{sku} title"),
        price: "$0.99".to_string(),
        description: format!("{sku} description"),
    }
}

pub fn purchase(sku: &str, token: &str, state: PurchaseStateValue, acknowledged: bool) -> Purchase {
    Purchase {
        skus: vec![sku.to_string()],
        purchase_token: token.to_string(),
        purchase_state: state,
        is_acknowledged: acknowledged,
        original_json: format!(r#"{{"productId":"{sku}","purchaseToken":"{token}"}}"#),
        signature: String::new(),
    }
}

pub fn history(sku: &str, token: &str) -> PurchaseHistoryRecord {
    PurchaseHistoryRecord {
        skus: vec![sku.to_string()],
        purchase_token: token.to_string(),
        purchase_time: 1_700_000_000_000,
        original_json: format!(r#"{{"productId":"{sku}"}}"#),
    }
}

pub fn purchases_updated(code: BillingResponseCode, purchases: Option<Vec<Purchase>>) -> BillingEvent {
    BillingEvent::PurchasesUpdated {
        billing_result: BillingResult::new(code, "scripted"),
        purchases,
    }
}

pub fn data_source(
    catalog: ProductCatalog,
) -> (BillingDataSource<FakeClient>, UnboundedReceiver<BillingEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ds = BillingDataSource::new(FakeClient::new(tx), catalog, ReconnectBackoff::default());
    (ds, rx)
}

/// Data source with its event loop running.
pub fn running(catalog: ProductCatalog) -> BillingDataSource<FakeClient> {
    let (ds, rx) = data_source(catalog);
    let runner = ds.clone();
    tokio::spawn(async move { runner.run(rx).await });
    ds
}

/// Callback that forwards every outcome into a channel.
pub fn collector() -> (BillingCallback, UnboundedReceiver<BillingOutcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: BillingCallback = Arc::new(move |code, message| {
        let _ = tx.send(BillingOutcome { code, message });
    });
    (callback, rx)
}

pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
