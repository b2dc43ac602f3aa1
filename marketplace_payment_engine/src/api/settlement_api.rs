use std::{collections::BTreeMap, fmt::Debug};

use futures_util::future::join_all;
use log::*;
use mpg_common::{CommissionRate, Money};
use thiserror::Error;

use crate::{
    db_types::{NewTransfer, Order, SettlementTopology, Transfer},
    events::{EventProducers, OrderPaidEvent, TransferFailedEvent},
    retry::RetryPolicy,
    traits::{PaymentGatewayDatabase, PaymentGatewayError, PaymentProcessor, TransferRequest},
};

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    Database(#[from] PaymentGatewayError),
}

/// What a capture confirmation amounted to.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// The confirmation did not match any pending order. Either a duplicate delivery for an order that is
    /// already paid, or a confirmation for an authorization this system never issued. Both are no-ops.
    AlreadyProcessed,
    /// The order was marked paid and no post-capture transfers were needed.
    Paid { order: Order },
    /// The order was marked paid and its seller payouts were executed. Exhausted transfers are included; they
    /// are flagged for reconciliation, not surfaced as errors.
    Settled { order: Order, transfers: Vec<Transfer> },
}

/// `SettlementApi` turns capture confirmations into paid orders and seller payouts.
///
/// Payout failure is isolated by design: a transfer that exhausts its retries flags the order for
/// reconciliation and fires an event, but `process_capture_confirmation` still returns success. The customer
/// has paid; whether a seller has been paid yet is the platform's problem, never the customer's.
pub struct SettlementApi<B, P> {
    db: B,
    processor: P,
    commission: CommissionRate,
    retry: RetryPolicy,
    producers: EventProducers,
}

impl<B, P> Debug for SettlementApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B, P> SettlementApi<B, P>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
{
    pub fn new(db: B, processor: P, commission: CommissionRate, retry: RetryPolicy, producers: EventProducers) -> Self {
        Self { db, processor, commission, retry, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Handle a verified capture confirmation for `authorization_id`.
    ///
    /// Marks the matching pending order `Paid`, then, for multi-party orders, creates and executes the seller
    /// transfers. Duplicate deliveries and unknown authorization ids resolve to
    /// [`CaptureOutcome::AlreadyProcessed`] so the caller can acknowledge them without side effects.
    pub async fn process_capture_confirmation(&self, authorization_id: &str) -> Result<CaptureOutcome, SettlementError> {
        let order = match self.db.confirm_capture(authorization_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                debug!("🔄️ Capture confirmation for [{authorization_id}] re-delivered. Ignoring.");
                return Ok(CaptureOutcome::AlreadyProcessed);
            },
            Err(PaymentGatewayError::AuthorizationNotFound(id)) => {
                warn!("🔄️ Capture confirmation for unknown authorization [{id}]. Ignoring.");
                return Ok(CaptureOutcome::AlreadyProcessed);
            },
            Err(e) => return Err(e.into()),
        };
        info!("🔄️ Order {} is paid ({} via {})", order.order_id, order.total_price, order.topology);
        self.call_order_paid_hook(&order).await;

        if order.topology != SettlementTopology::MultiParty {
            return Ok(CaptureOutcome::Paid { order });
        }
        let transfers = self.settle_multi_party(&order).await?;
        Ok(CaptureOutcome::Settled { order, transfers })
    }

    /// Create and execute the seller payouts for a paid multi-party order.
    ///
    /// Transfer amounts are recomputed from the stored order lines with the same commission arithmetic the
    /// planner used at checkout, so the split survives restarts without persisting the plan itself.
    async fn settle_multi_party(&self, order: &Order) -> Result<Vec<Transfer>, SettlementError> {
        let lines = self.db.lines_for_order(order.id).await?;
        let mut subtotals: BTreeMap<i64, Money> = BTreeMap::new();
        for line in &lines {
            if let Some(id) = line.seller_id {
                let entry = subtotals.entry(id).or_default();
                *entry = *entry + line.subtotal();
            }
        }
        let seller_ids = subtotals.keys().copied().collect::<Vec<_>>();
        let sellers = self.db.sellers_by_ids(&seller_ids).await?;
        let mut new_transfers = Vec::with_capacity(subtotals.len());
        for (seller_id, subtotal) in &subtotals {
            let Some(seller) = sellers.iter().find(|s| s.id == *seller_id) else {
                // a seller row deleted between checkout and capture; leave the payout to reconciliation
                error!("🔄️ Seller {seller_id} vanished before settlement of order {}", order.order_id);
                continue;
            };
            new_transfers.push(NewTransfer {
                order_id: order.id,
                seller_id: *seller_id,
                amount: self.commission.remainder_of(*subtotal),
                destination_account: seller.payout_account.clone(),
            });
        }
        let transfers = self.db.create_transfers(new_transfers).await?;
        let results = join_all(transfers.into_iter().map(|t| self.execute_transfer(order, t))).await;
        results.into_iter().collect()
    }

    /// Drive one transfer to a terminal state, retrying with linearly increasing delays.
    async fn execute_transfer(&self, order: &Order, transfer: Transfer) -> Result<Transfer, SettlementError> {
        let mut attempt = transfer.attempts as u32;
        loop {
            attempt += 1;
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let request = TransferRequest {
                amount: transfer.amount,
                currency: order.currency.clone(),
                destination_account: transfer.destination_account.clone(),
                reference: format!("transfer-{}-{}-{attempt}", order.order_id, transfer.seller_id),
            };
            match self.processor.transfer(request).await {
                Ok(handle) => {
                    info!(
                        "🔄️ Transfer #{} of {} to seller {} succeeded as [{}] on attempt {attempt}",
                        transfer.id, transfer.amount, transfer.seller_id, handle.transfer_id
                    );
                    return Ok(self.db.transfer_succeeded(transfer.id, attempt, &handle.transfer_id).await?);
                },
                Err(e) if self.retry.attempts_remain_after(attempt) => {
                    warn!("🔄️ Transfer #{} attempt {attempt} failed: {e}. Will retry.", transfer.id);
                    self.db.record_transfer_failure(transfer.id, attempt, &e.to_string()).await?;
                },
                Err(e) => {
                    error!(
                        "🔄️ Transfer #{} to seller {} exhausted its {attempt} attempts: {e}. Order {} needs \
                         reconciliation.",
                        transfer.id, transfer.seller_id, order.order_id
                    );
                    let transfer = self.db.transfer_exhausted(transfer.id, attempt, &e.to_string()).await?;
                    self.call_transfer_failed_hook(order, &transfer).await;
                    return Ok(transfer);
                },
            }
        }
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        trace!("🔄️ Notifying {} subscriber(s) that order {} is paid", self.producers.order_paid_producer.len(), order.order_id);
        for producer in &self.producers.order_paid_producer {
            producer.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_transfer_failed_hook(&self, order: &Order, transfer: &Transfer) {
        for producer in &self.producers.transfer_failed_producer {
            producer.publish_event(TransferFailedEvent::new(order.clone(), transfer.clone())).await;
        }
    }
}
