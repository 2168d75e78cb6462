use serde::Deserialize;

use crate::catalog::{CatalogEntry, ProductCatalog};
use crate::connection::ReconnectConfig;

/// `plugins.billing` section of `tauri.conf.json`.
///
/// ```json
/// "billing": {
///   "products": [
///     { "id": "coins_100", "type": "consumable" },
///     { "id": "remove_ads", "type": "non_consumable" }
///   ],
///   "reconnect": { "initialDelayMs": 1000, "maxDelayMs": 900000 }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub products: Vec<CatalogEntry>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Config {
    pub fn catalog(&self) -> ProductCatalog {
        self.products.iter().cloned().collect()
    }
}
