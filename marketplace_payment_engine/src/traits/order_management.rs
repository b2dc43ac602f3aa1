use crate::{
    db_types::{Order, OrderId, OrderLine, OwningParty, Refund, Transfer},
    traits::PaymentGatewayError,
};

/// Read-side queries over orders, transfers and refunds.
///
/// [`OrderManagement::refunds_for_party`] is the access-control boundary for refunds: dashboards and refund
/// actions are scoped by this predicate, not by UI hiding.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    async fn order_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    async fn order_by_pk(&self, order_pk: i64) -> Result<Option<Order>, PaymentGatewayError>;

    /// Resolve a processor capture confirmation back to its order. The authorization handle is the only
    /// correlation data available.
    async fn order_by_authorization(&self, authorization_id: &str) -> Result<Option<Order>, PaymentGatewayError>;

    async fn lines_for_order(&self, order_pk: i64) -> Result<Vec<OrderLine>, PaymentGatewayError>;

    async fn transfer_by_id(&self, transfer_id: i64) -> Result<Option<Transfer>, PaymentGatewayError>;

    async fn transfers_for_order(&self, order_pk: i64) -> Result<Vec<Transfer>, PaymentGatewayError>;

    /// All `FailedExhausted` transfers: the reconciliation work queue for the admin dashboard.
    async fn unresolved_transfers(&self) -> Result<Vec<Transfer>, PaymentGatewayError>;

    async fn refund_by_id(&self, refund_id: i64) -> Result<Option<Refund>, PaymentGatewayError>;

    async fn refunds_for_order(&self, order_pk: i64) -> Result<Vec<Refund>, PaymentGatewayError>;

    /// Only the refunds owned by `party`. A seller can never see, let alone act on, another party's refunds.
    async fn refunds_for_party(&self, party: &OwningParty) -> Result<Vec<Refund>, PaymentGatewayError>;
}
