use std::time::Duration;

use mpg_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::planner::FeeSpec;

/// Errors surfaced by the external payment processor.
///
/// `Timeout` is special: the processor may well have executed the request despite the timed-out response, so
/// callers must reconcile via the idempotency key before treating the operation as failed.
#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("The processor did not respond within {0:?}")]
    Timeout(Duration),
    #[error("The charge was declined: {0}")]
    Declined(String),
    #[error("Processor API error: {0}")]
    Api(String),
    #[error("The processor is unavailable: {0}")]
    Unavailable(String),
}

/// An authorize-with-optional-destination-and-fee request. The `idempotency_key` is derived
/// deterministically from the pending order id, so a client retry after a network timeout can never
/// double-charge the customer.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub amount: Money,
    pub currency: String,
    pub idempotency_key: String,
    pub fee_spec: FeeSpec,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationHandle {
    pub authorization_id: String,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub amount: Money,
    pub currency: String,
    pub destination_account: String,
    /// `transfer-<order>-<seller>-<attempt>` so a processor-side duplicate of a retried attempt is detectable.
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHandle {
    pub transfer_id: String,
}

/// A reversal keyed by the original authorization, per the refund protocol.
#[derive(Debug, Clone)]
pub struct ReversalRequest {
    pub authorization_id: String,
    pub amount: Money,
    pub currency: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalHandle {
    pub reversal_id: String,
}

/// The abstraction over any payment processor that supports destination charges, application fees,
/// independent transfers and reversals. The engine never sees a concrete processor API shape.
///
/// Capture confirmation is *not* part of this trait: processors deliver it asynchronously (webhook or
/// equivalent) and that delivery, not a successful `authorize` response, is the single source of truth for
/// "payment actually succeeded".
#[allow(async_fn_in_trait)]
pub trait PaymentProcessor: Clone + Send + Sync {
    /// Authorize a charge. Must be idempotent under the supplied idempotency key.
    async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationHandle, ProcessorError>;

    /// Look up an authorization by its idempotency key. Used to reconcile after a timed-out `authorize` call:
    /// `Ok(None)` means the processor definitely never executed the charge.
    async fn lookup_authorization(&self, idempotency_key: &str) -> Result<Option<AuthorizationHandle>, ProcessorError>;

    /// Move funds from the platform balance to a seller's payout account.
    async fn transfer(&self, request: TransferRequest) -> Result<TransferHandle, ProcessorError>;

    /// Reverse (part of) a captured charge back to the customer.
    async fn reverse(&self, request: ReversalRequest) -> Result<ReversalHandle, ProcessorError>;
}
