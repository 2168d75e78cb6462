use tauri::{command, AppHandle, Runtime, Window};

use crate::models::*;
use crate::{BillingExt, Result};

#[command]
pub(crate) async fn purchase<R: Runtime>(
    app: AppHandle<R>,
    window: Window<R>,
    payload: PurchaseRequest,
) -> Result<PurchaseResponse> {
    app.billing()
        .purchase(window.label().to_string(), payload.product_id)
        .await
}

#[command]
pub(crate) async fn restore_purchases<R: Runtime>(
    app: AppHandle<R>,
    window: Window<R>,
) -> Result<RestorePurchasesResponse> {
    app.billing()
        .restore_purchases(window.label().to_string())
        .await
}

#[command]
pub(crate) async fn acknowledge_pending_purchases<R: Runtime>(
    app: AppHandle<R>,
    window: Window<R>,
) -> Result<Vec<BillingOutcome>> {
    app.billing()
        .acknowledge_pending_purchases(window.label().to_string())
        .await
}

#[command]
pub(crate) async fn get_product_details<R: Runtime>(
    app: AppHandle<R>,
    payload: GetProductDetailsRequest,
) -> Result<Option<ProductDetails>> {
    Ok(app.billing().get_product_details(&payload.product_id))
}

#[command]
pub(crate) async fn get_connection_state<R: Runtime>(app: AppHandle<R>) -> Result<ConnectionState> {
    Ok(app.billing().get_connection_state())
}
