use mpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{ConversionError, NewOrder, NewOrderLine, NewRefund, NewTransfer, Order, OrderId, Refund, Transfer},
    traits::{OrderManagement, SellerManagement},
};

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("No order matches authorization '{0}'")]
    AuthorizationNotFound(String),
    #[error("Product {0} not found")]
    ProductNotFound(i64),
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: i64 },
    #[error("Transfer {0} not found")]
    TransferNotFound(i64),
    #[error("Refund {0} not found")]
    RefundNotFound(i64),
    #[error("Illegal state transition: {0}")]
    IllegalStateTransition(String),
    #[error("Conversion error: {0}")]
    ConversionError(#[from] ConversionError),
}

/// This trait defines the highest level of behaviour for database backends supporting the payment engine.
///
/// The behaviour includes:
/// * The inventory guard and order ledger: stock reservation and order persistence as one atomic unit
/// * Settlement bookkeeping for seller transfers, including the durable failure trail
/// * The refund lifecycle state machine
///
/// Transfer and refund rows are append-mostly: they transition status, and are never deleted.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + OrderManagement + SellerManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// In a single atomic transaction, decrement stock for every line (failing the whole transaction if any
    /// product has less stock than requested) and persist the order with its line snapshots in `Pending`
    /// status.
    ///
    /// The call is idempotent on `order.order_id`: re-submitting an order id that already exists returns the
    /// stored order with `false`, and does not touch stock again.
    async fn create_order_with_reservation(
        &self,
        order: NewOrder,
        lines: Vec<NewOrderLine>,
    ) -> Result<(Order, bool), PaymentGatewayError>;

    /// Store the processor authorization handle against the order. The handle is the correlation key by which
    /// capture confirmations find their order later.
    async fn attach_authorization(&self, order_id: &OrderId, authorization_id: &str) -> Result<Order, PaymentGatewayError>;

    /// Cancel a still-`Pending` order and restore the reserved stock, atomically. Called when authorization
    /// is declined or confirmed-failed after a timeout.
    async fn cancel_unpaid_order(&self, order_id: &OrderId, reason: &str) -> Result<Order, PaymentGatewayError>;

    /// Transition the order matching `authorization_id` from `Pending` to `Paid`.
    ///
    /// Returns `None` if the order is already paid (webhook re-delivery is a no-op) and an error if no order
    /// carries the authorization.
    async fn confirm_capture(&self, authorization_id: &str) -> Result<Option<Order>, PaymentGatewayError>;

    /// Persist one pending transfer per planned seller payout, atomically.
    async fn create_transfers(&self, transfers: Vec<NewTransfer>) -> Result<Vec<Transfer>, PaymentGatewayError>;

    /// Record a non-final failed attempt against a transfer.
    async fn record_transfer_failure(
        &self,
        transfer_id: i64,
        attempts: u32,
        error: &str,
    ) -> Result<(), PaymentGatewayError>;

    /// Mark a transfer as succeeded, with its final attempt count and the processor's transfer reference.
    async fn transfer_succeeded(
        &self,
        transfer_id: i64,
        attempts: u32,
        processor_transfer_id: &str,
    ) -> Result<Transfer, PaymentGatewayError>;

    /// Mark a transfer as `FailedExhausted` and flag its order for manual reconciliation, atomically. The
    /// customer-visible order status is not touched.
    async fn transfer_exhausted(
        &self,
        transfer_id: i64,
        attempts: u32,
        error: &str,
    ) -> Result<Transfer, PaymentGatewayError>;

    /// Persist a new refund in `Pending` status and move its order to `RefundRequested`, atomically.
    async fn create_refund(&self, refund: NewRefund) -> Result<Refund, PaymentGatewayError>;

    /// The sum of all `Completed` refund amounts against the order.
    async fn completed_refund_total(&self, order_pk: i64) -> Result<Money, PaymentGatewayError>;

    /// Transition a refund from `Pending` to `Processing`. This is persisted *before* the processor reversal
    /// call so a crash mid-call leaves an inspectable in-flight record.
    async fn begin_refund_processing(&self, refund_id: i64) -> Result<Refund, PaymentGatewayError>;

    /// Transition a refund from `Processing` to `Completed`, storing the reversal handle and approver. When
    /// the order's completed refunds now cover its full total, the order moves to `Refunded`.
    async fn complete_refund(
        &self,
        refund_id: i64,
        reversal_id: &str,
        processed_by: &str,
        notes: Option<&str>,
    ) -> Result<Refund, PaymentGatewayError>;

    /// Transition a refund from `Processing` to `Failed`, retaining the processor error detail for manual
    /// re-submission.
    async fn fail_refund(&self, refund_id: i64, error: &str) -> Result<Refund, PaymentGatewayError>;

    /// Transition a refund from `Pending` to `Cancelled` with the given reason. If no other open refunds
    /// remain against the order, the order returns to `Paid`.
    async fn cancel_refund(&self, refund_id: i64, reason: &str, cancelled_by: &str) -> Result<Refund, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}
