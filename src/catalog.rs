use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Consumable,
    #[default]
    NonConsumable,
}

impl<'de> Deserialize<'de> for ProductKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // anything but "consumable" is a one-time product
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "consumable" => ProductKind::Consumable,
            _ => ProductKind::NonConsumable,
        })
    }
}

/// One entry of the application's in-app product list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ProductKind,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, kind: ProductKind) -> Self {
        Self { id: id.into(), kind }
    }
}

/// Reference list of known product identifiers.
///
/// A SKU is valid only when it is listed here.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    entries: HashMap<String, ProductKind>,
}

impl ProductCatalog {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id, e.kind)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_valid(&self, sku: &str) -> bool {
        self.entries.contains_key(sku)
    }

    /// Unknown SKUs are never consumable.
    pub fn is_consumable(&self, sku: &str) -> bool {
        self.entries.get(sku) == Some(&ProductKind::Consumable)
    }

    pub fn kind(&self, sku: &str) -> Option<ProductKind> {
        self.entries.get(sku).copied()
    }
}

impl FromIterator<CatalogEntry> for ProductCatalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        Self::new(iter)
    }
}
