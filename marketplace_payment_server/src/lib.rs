//! # Marketplace Payment Server
//!
//! The HTTP surface over [`marketplace_payment_engine`]: checkout submission, the processor's
//! capture-confirmation webhook, the refund lifecycle endpoints and the order/transfer dashboards.
//!
//! The server owns no business rules. It deserializes, verifies webhook signatures, extracts the caller
//! identity from the trusted header, and hands everything to the engine APIs; every authorization decision
//! that matters (refund ownership in particular) is made in the engine, not here.

pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod processor;
pub mod routes;
pub mod server;
