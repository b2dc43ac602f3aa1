//! Marketplace Payment Engine
//!
//! The engine turns a multi-seller shopping cart into money in the right accounts: it plans the settlement,
//! reserves stock and persists the order atomically, authorizes the charge, pays sellers out after capture,
//! and runs the refund lifecycle. It is processor-agnostic and server-agnostic.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). Sqlite is the supported backend. You should never
//!    need to access the database directly; use the public API instead. The exception is the data types used
//!    in the database, which are defined in [`mod@db_types`] and are public.
//! 2. The payment engine public API ([`mod@api`]). Checkout, settlement and refunds each have their own API
//!    struct, generic over the backend traits in [`mod@traits`], so a server binary composes exactly the
//!    flows it serves.
//! 3. The settlement planner ([`mod@planner`]), the pure core that decides who gets paid what.
//!
//! The engine also provides a set of events that can be subscribed to ([`mod@events`]). Events are emitted
//! when an order is paid, when a seller payout exhausts its retries, and at every refund lifecycle edge. A
//! simple actor framework is used so that you can hook into these events and perform custom actions, such as
//! sending notification emails, without ever blocking a payment flow.

pub mod api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod planner;
pub mod retry;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    CaptureOutcome,
    CartLine,
    CheckoutApi,
    CheckoutError,
    CheckoutRequest,
    RefundApi,
    RefundApiError,
    RefundRequest,
    SettlementApi,
    SettlementError,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db_url, new_pool, SqliteDatabase, SqliteDatabaseError};
pub use traits::{OrderManagement, PaymentGatewayDatabase, PaymentProcessor, SellerManagement};
