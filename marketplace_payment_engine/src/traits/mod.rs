//! Interface contracts of the payment engine backends and collaborators.
//!
//! * [`PaymentGatewayDatabase`] defines the highest level of behaviour for database backends: atomic checkout
//!   persistence (the inventory guard and order ledger), settlement bookkeeping, and the refund lifecycle.
//! * [`OrderManagement`] defines the read-side queries over orders, transfers and refunds, including the
//!   ownership-scoped refund query that enforces the refund visibility boundary.
//! * [`SellerManagement`] defines the read-only catalog/seller lookups consumed by the planner and checkout.
//! * [`PaymentProcessor`] abstracts the external payment processor (authorize / transfer / reverse).

mod order_management;
mod payment_gateway_database;
mod payment_processor;
mod seller_management;

pub use order_management::OrderManagement;
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
pub use payment_processor::{
    AuthorizationHandle,
    AuthorizationRequest,
    PaymentProcessor,
    ProcessorError,
    ReversalHandle,
    ReversalRequest,
    TransferHandle,
    TransferRequest,
};
pub use seller_management::SellerManagement;
