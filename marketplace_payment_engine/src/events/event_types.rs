use serde::{Deserialize, Serialize};

use crate::db_types::{Order, Refund, Transfer};

/// Emitted when a capture confirmation moves an order to `Paid`. The notifier mails the customer; the
/// storefront can release fulfilment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when a seller payout exhausts its retries. This is an operator-facing alert; the durable record
/// lives in the transfers table, not in this event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferFailedEvent {
    pub order: Order,
    pub transfer: Transfer,
}

impl TransferFailedEvent {
    pub fn new(order: Order, transfer: Transfer) -> Self {
        Self { order, transfer }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundOutcome {
    Requested,
    Completed,
    Failed,
    Cancelled,
}

/// Emitted at every refund lifecycle edge, addressed to the refund's owning party (and, for terminal
/// outcomes, the customer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSettledEvent {
    pub refund: Refund,
    pub outcome: RefundOutcome,
}

impl RefundSettledEvent {
    pub fn new(refund: Refund, outcome: RefundOutcome) -> Self {
        Self { refund, outcome }
    }
}
