use serde::{Deserialize, Serialize};

/// Response codes reported by the platform billing SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillingResponseCode {
    ServiceTimeout,
    FeatureNotSupported,
    ServiceDisconnected,
    Ok,
    UserCanceled,
    ServiceUnavailable,
    BillingUnavailable,
    ItemUnavailable,
    DeveloperError,
    Error,
    ItemAlreadyOwned,
    ItemNotOwned,
    NetworkError,
    Other(i32),
}

impl BillingResponseCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            -3 => Self::ServiceTimeout,
            -2 => Self::FeatureNotSupported,
            -1 => Self::ServiceDisconnected,
            0 => Self::Ok,
            1 => Self::UserCanceled,
            2 => Self::ServiceUnavailable,
            3 => Self::BillingUnavailable,
            4 => Self::ItemUnavailable,
            5 => Self::DeveloperError,
            6 => Self::Error,
            7 => Self::ItemAlreadyOwned,
            8 => Self::ItemNotOwned,
            12 => Self::NetworkError,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::ServiceTimeout => -3,
            Self::FeatureNotSupported => -2,
            Self::ServiceDisconnected => -1,
            Self::Ok => 0,
            Self::UserCanceled => 1,
            Self::ServiceUnavailable => 2,
            Self::BillingUnavailable => 3,
            Self::ItemUnavailable => 4,
            Self::DeveloperError => 5,
            Self::Error => 6,
            Self::ItemAlreadyOwned => 7,
            Self::ItemNotOwned => 8,
            Self::NetworkError => 12,
            Self::Other(code) => code,
        }
    }
}

impl Serialize for BillingResponseCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for BillingResponseCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        i32::deserialize(deserializer).map(Self::from_code)
    }
}

/// Result codes relayed to application callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok = 0,
    UserCanceled = 1,
    BillingUnavailable = 3,
    ItemUnavailable = 4,
    DeveloperError = 5,
    Error = 6,
    ItemAlreadyOwned = 7,
    ItemNotOwned = 8,
    NoRestore = 9,
    RestoreCompleted = 10,
}

impl ResultCode {
    /// Maps an SDK code to the code relayed to callers.
    ///
    /// Returns `None` for codes the purchase layer only logs.
    pub fn from_response(code: BillingResponseCode) -> Option<Self> {
        match code {
            BillingResponseCode::Ok => Some(Self::Ok),
            BillingResponseCode::ServiceDisconnected
            | BillingResponseCode::ServiceUnavailable
            | BillingResponseCode::BillingUnavailable
            | BillingResponseCode::ItemUnavailable
            | BillingResponseCode::FeatureNotSupported
            | BillingResponseCode::DeveloperError
            | BillingResponseCode::Error => Some(Self::Error),
            BillingResponseCode::UserCanceled => Some(Self::UserCanceled),
            BillingResponseCode::ItemNotOwned => Some(Self::ItemNotOwned),
            BillingResponseCode::ItemAlreadyOwned => Some(Self::ItemAlreadyOwned),
            BillingResponseCode::ServiceTimeout
            | BillingResponseCode::NetworkError
            | BillingResponseCode::Other(_) => None,
        }
    }

    /// Closest caller-facing code for an SDK failure, never `None`.
    pub fn from_failure(code: BillingResponseCode) -> Self {
        match code {
            BillingResponseCode::UserCanceled => Self::UserCanceled,
            BillingResponseCode::BillingUnavailable => Self::BillingUnavailable,
            BillingResponseCode::ItemUnavailable => Self::ItemUnavailable,
            BillingResponseCode::DeveloperError => Self::DeveloperError,
            BillingResponseCode::ItemAlreadyOwned => Self::ItemAlreadyOwned,
            BillingResponseCode::ItemNotOwned => Self::ItemNotOwned,
            _ => Self::Error,
        }
    }
}

impl Serialize for ResultCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(*self as i32)
    }
}

impl<'de> Deserialize<'de> for ResultCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i32::deserialize(deserializer)?;
        match value {
            0 => Ok(ResultCode::Ok),
            1 => Ok(ResultCode::UserCanceled),
            3 => Ok(ResultCode::BillingUnavailable),
            4 => Ok(ResultCode::ItemUnavailable),
            5 => Ok(ResultCode::DeveloperError),
            6 => Ok(ResultCode::Error),
            7 => Ok(ResultCode::ItemAlreadyOwned),
            8 => Ok(ResultCode::ItemNotOwned),
            9 => Ok(ResultCode::NoRestore),
            10 => Ok(ResultCode::RestoreCompleted),
            _ => Err(serde::de::Error::custom(format!(
                "Invalid result code: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingResult {
    pub response_code: BillingResponseCode,
    #[serde(default)]
    pub debug_message: String,
}

impl BillingResult {
    pub fn new(response_code: BillingResponseCode, debug_message: impl Into<String>) -> Self {
        Self {
            response_code,
            debug_message: debug_message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(BillingResponseCode::Ok, "")
    }

    pub fn is_ok(&self) -> bool {
        self.response_code == BillingResponseCode::Ok
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    pub sku: String,
    pub title: String,
    pub price: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PurchaseStateValue {
    Purchased = 0,
    Canceled = 1,
    Pending = 2,
}

impl Serialize for PurchaseStateValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(*self as i32)
    }
}

impl<'de> Deserialize<'de> for PurchaseStateValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i32::deserialize(deserializer)?;
        match value {
            0 => Ok(PurchaseStateValue::Purchased),
            1 => Ok(PurchaseStateValue::Canceled),
            2 => Ok(PurchaseStateValue::Pending),
            _ => Err(serde::de::Error::custom(format!(
                "Invalid purchase state: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub skus: Vec<String>,
    pub purchase_token: String,
    pub purchase_state: PurchaseStateValue,
    pub is_acknowledged: bool,
    #[serde(default)]
    pub original_json: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseHistoryRecord {
    pub skus: Vec<String>,
    pub purchase_token: String,
    pub purchase_time: i64,
    #[serde(default)]
    pub original_json: String,
}

/// Product id carried in the store's original purchase JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OriginalPurchaseJson {
    product_id: String,
}

/// Product id of a purchase, read from its original JSON and falling back to
/// the first SKU when the JSON is missing or malformed.
pub(crate) fn product_id_of(original_json: &str, skus: &[String]) -> Option<String> {
    match serde_json::from_str::<OriginalPurchaseJson>(original_json) {
        Ok(parsed) => Some(parsed.product_id),
        Err(e) => {
            if !original_json.is_empty() {
                tracing::debug!("unreadable purchase json, using first sku: {e}");
            }
            skus.first().cloned()
        }
    }
}

impl Purchase {
    pub fn product_id(&self) -> Option<String> {
        product_id_of(&self.original_json, &self.skus)
    }
}

impl PurchaseHistoryRecord {
    pub fn product_id(&self) -> Option<String> {
        product_id_of(&self.original_json, &self.skus)
    }
}

/// Outcome passed to a callback: a result code and a human readable message.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingOutcome {
    pub code: ResultCode,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub product_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub product_id: String,
    pub success: bool,
    pub code: ResultCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorePurchasesResponse {
    pub restored: Vec<String>,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ResultCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProductDetailsRequest {
    pub product_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub connected: bool,
    pub billing_flow_in_process: bool,
    pub sku_details_fresh: bool,
}
