use tauri::{
  plugin::{Builder, TauriPlugin},
  Manager, Runtime,
};
use tokio::sync::mpsc;

pub use models::*;

#[cfg(not(target_os = "android"))]
mod desktop;
#[cfg(target_os = "android")]
mod mobile;

pub mod bridge;
pub mod catalog;
pub mod client;
mod commands;
pub mod config;
pub mod connection;
pub mod data_source;
mod error;
mod models;
mod plugin;

pub use bridge::StoreBridge;
pub use catalog::{CatalogEntry, ProductCatalog, ProductKind};
pub use client::{BillingClient, BillingEvent};
pub use config::Config;
pub use connection::{ReconnectBackoff, ReconnectConfig};
pub use data_source::{BillingCallback, BillingDataSource};
pub use error::{Error, Result};
pub use plugin::{Billing, PENDING_PURCHASE_EVENT, RESTORED_EVENT};

#[cfg(not(target_os = "android"))]
pub use desktop::PlatformBillingClient;
#[cfg(target_os = "android")]
pub use mobile::PlatformBillingClient;

/// Extensions to [`tauri::App`], [`tauri::AppHandle`] and [`tauri::Window`] to access the billing APIs.
pub trait BillingExt<R: Runtime> {
  fn billing(&self) -> &Billing<R>;
}

impl<R: Runtime, T: Manager<R>> crate::BillingExt<R> for T {
  fn billing(&self) -> &Billing<R> {
    self.state::<Billing<R>>().inner()
  }
}

/// Initializes the plugin.
pub fn init<R: Runtime>() -> TauriPlugin<R, Option<Config>> {
  Builder::<R, Option<Config>>::new("billing")
    .invoke_handler(tauri::generate_handler![
      commands::purchase,
      commands::restore_purchases,
      commands::acknowledge_pending_purchases,
      commands::get_product_details,
      commands::get_connection_state,
    ])
    .setup(|app, api| {
      let config = api.config().clone().unwrap_or_default();
      let (events_tx, events_rx) = mpsc::unbounded_channel();

      #[cfg(target_os = "android")]
      let client = mobile::init(app, api, events_tx)?;
      #[cfg(not(target_os = "android"))]
      let client = desktop::init(app, api, events_tx)?;

      tracing::info!("billing catalog has {} products", config.products.len());
      let data_source = BillingDataSource::new(client, config.catalog(), config.reconnect.into());
      let runner = data_source.clone();
      tauri::async_runtime::spawn(async move { runner.run(events_rx).await });

      app.manage(Billing::new(app.clone(), StoreBridge::new(data_source)));
      Ok(())
    })
    .build()
}
