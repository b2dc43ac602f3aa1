//! # Payment engine public API
//!
//! The API is modular: clients pick the flows they need. Each API instance is created by supplying a database
//! backend implementing the traits in [`crate::traits`], plus (where the flow moves money) a
//! [`crate::traits::PaymentProcessor`].
//!
//! * [`checkout_api`] runs the checkout pipeline: cart snapshot, settlement planning, atomic stock
//!   reservation + order persistence, and payment authorization.
//! * [`settlement_api`] reacts to capture confirmations: marks orders paid and executes seller payouts with
//!   bounded retry.
//! * [`refund_api`] owns the refund lifecycle: ownership routing, the approval authorization check, the
//!   processor reversal and cancellation.

pub mod checkout_api;
pub mod refund_api;
pub mod settlement_api;

pub use checkout_api::{CartLine, CheckoutApi, CheckoutError, CheckoutRequest};
pub use refund_api::{RefundApi, RefundApiError, RefundRequest};
pub use settlement_api::{CaptureOutcome, SettlementApi, SettlementError};
