//! The sandbox payment processor.
//!
//! No concrete processor integration ships with the gateway; deployments plug their own
//! [`PaymentProcessor`] implementation into [`crate::server::create_server_instance`]. This module provides
//! the sandbox backend the default binary runs with: every operation succeeds and is fully logged, so the
//! whole checkout/settlement/refund surface can be exercised end to end without moving real money.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::*;
use marketplace_payment_engine::traits::{
    AuthorizationHandle,
    AuthorizationRequest,
    PaymentProcessor,
    ProcessorError,
    ReversalHandle,
    ReversalRequest,
    TransferHandle,
    TransferRequest,
};

#[derive(Clone, Default)]
pub struct SandboxProcessor {
    serial: Arc<AtomicU64>,
    prefix: u32,
}

impl SandboxProcessor {
    pub fn new() -> Self {
        // a per-instance prefix keeps handles distinct across restarts
        Self { serial: Arc::new(AtomicU64::new(0)), prefix: rand::random::<u32>() }
    }

    fn next_handle(&self, kind: &str) -> String {
        let n = self.serial.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{kind}_sandbox_{:08x}_{n}", self.prefix)
    }
}

impl PaymentProcessor for SandboxProcessor {
    async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationHandle, ProcessorError> {
        let authorization_id = self.next_handle("auth");
        info!(
            "🏦️ [sandbox] Authorized {} {} as [{authorization_id}] (key {})",
            request.amount, request.currency, request.idempotency_key
        );
        Ok(AuthorizationHandle { authorization_id })
    }

    async fn lookup_authorization(&self, idempotency_key: &str) -> Result<Option<AuthorizationHandle>, ProcessorError> {
        debug!("🏦️ [sandbox] Lookup for key {idempotency_key}: nothing executed");
        Ok(None)
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferHandle, ProcessorError> {
        let transfer_id = self.next_handle("tr");
        info!(
            "🏦️ [sandbox] Transferred {} {} to {} as [{transfer_id}] ({})",
            request.amount, request.currency, request.destination_account, request.reference
        );
        Ok(TransferHandle { transfer_id })
    }

    async fn reverse(&self, request: ReversalRequest) -> Result<ReversalHandle, ProcessorError> {
        let reversal_id = self.next_handle("rev");
        info!(
            "🏦️ [sandbox] Reversed {} {} on [{}] as [{reversal_id}]",
            request.amount, request.currency, request.authorization_id
        );
        Ok(ReversalHandle { reversal_id })
    }
}
