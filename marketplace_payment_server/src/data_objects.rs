use std::fmt::Display;

use marketplace_payment_engine::db_types::{DeliveryContact, Order, OrderId, Refund, Transfer};
use mpg_common::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLinePayload {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPayload {
    pub order_id: OrderId,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub contact: DeliveryContact,
    pub lines: Vec<CartLinePayload>,
}

/// The verified capture confirmation body delivered by the payment processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureNotification {
    pub authorization_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundPayload {
    /// The order line ids the refund covers. Empty or omitted means every line.
    #[serde(default)]
    pub line_ids: Vec<i64>,
    /// Omitted means the full subtotal of the covered lines.
    #[serde(default)]
    pub amount: Option<Money>,
    pub reason: String,
    pub requested_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRefundPayload {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRefundPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order: Order,
    pub transfers: Vec<Transfer>,
    pub refunds: Vec<Refund>,
}
