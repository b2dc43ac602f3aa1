use std::{collections::HashSet, fmt::Debug};

use log::*;
use mpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{NewRefund, OrderId, OrderStatusType, OwningParty, Principal, Refund, RefundKind},
    events::{EventProducers, RefundOutcome, RefundSettledEvent},
    planner::SettlementPlan,
    traits::{PaymentGatewayDatabase, PaymentGatewayError, PaymentProcessor, ProcessorError, ReversalRequest},
};

#[derive(Debug, Clone, Error)]
pub enum RefundApiError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Refund {0} not found")]
    RefundNotFound(i64),
    #[error("Order {order_id} cannot be refunded: {reason}")]
    OrderNotRefundable { order_id: OrderId, reason: String },
    #[error("Refund request references lines that do not belong to the order")]
    UnknownLines,
    #[error("The requested lines belong to more than one party and cannot be covered by a single refund")]
    MixedOwnership,
    #[error("Requested refund of {requested} exceeds the refundable amount of {refundable}")]
    ExceedsRefundable { requested: Money, refundable: Money },
    #[error("Refund amounts must be positive")]
    InvalidAmount,
    #[error("A refund request must carry a reason")]
    ReasonRequired,
    #[error("Only the refund's owning party may act on it")]
    NotRefundOwner,
    #[error("Refund is not in a state that allows this action: {0}")]
    InvalidState(String),
    #[error("The processor reversal failed: {0}")]
    Processor(#[from] ProcessorError),
    #[error("Database error: {0}")]
    Database(PaymentGatewayError),
}

impl From<PaymentGatewayError> for RefundApiError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::RefundNotFound(id) => RefundApiError::RefundNotFound(id),
            PaymentGatewayError::IllegalStateTransition(msg) => RefundApiError::InvalidState(msg),
            e => RefundApiError::Database(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub order_id: OrderId,
    /// The order line ids the refund covers. Empty means every line of the order.
    pub line_ids: Vec<i64>,
    /// `None` means the full subtotal of the covered lines.
    pub amount: Option<Money>,
    pub reason: String,
    pub requested_by: String,
}

/// `RefundApi` implements the refund lifecycle: request, process (approve and reverse at the processor),
/// and cancel, with every action gated on the refund's owning party.
///
/// A refund belongs to exactly one party, derived from the seller references of its covered lines when it is
/// created. Ownership routing is enforced here, in the engine, so no alternative surface can bypass it.
pub struct RefundApi<B, P> {
    db: B,
    processor: P,
    producers: EventProducers,
}

impl<B, P> Debug for RefundApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B, P> RefundApi<B, P>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
{
    pub fn new(db: B, processor: P, producers: EventProducers) -> Self {
        Self { db, processor, producers }
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

    /// File a refund request against a paid order.
    ///
    /// The covered lines must all belong to the same party; that party becomes the refund's immutable owner.
    /// The amount, when given, may not push the order's completed refunds past its total.
    pub async fn request_refund(&self, request: RefundRequest) -> Result<Refund, RefundApiError> {
        if request.reason.trim().is_empty() {
            return Err(RefundApiError::ReasonRequired);
        }
        let order = self
            .db
            .order_by_id(&request.order_id)
            .await?
            .ok_or_else(|| RefundApiError::OrderNotFound(request.order_id.clone()))?;
        match order.status {
            OrderStatusType::Paid | OrderStatusType::RefundRequested | OrderStatusType::SettlementFailed => {},
            status => {
                return Err(RefundApiError::OrderNotRefundable {
                    order_id: order.order_id,
                    reason: format!("order status is {status}"),
                })
            },
        }

        let lines = self.db.lines_for_order(order.id).await?;
        let covered = if request.line_ids.is_empty() {
            lines.iter().collect::<Vec<_>>()
        } else {
            let wanted = request.line_ids.iter().copied().collect::<HashSet<_>>();
            let covered = lines.iter().filter(|l| wanted.contains(&l.id)).collect::<Vec<_>>();
            if covered.len() != wanted.len() {
                return Err(RefundApiError::UnknownLines);
            }
            covered
        };
        let owning_party = SettlementPlan::refund_owner(&covered).ok_or(RefundApiError::MixedOwnership)?;

        let covered_subtotal: Money = covered.iter().map(|l| l.subtotal()).sum();
        let amount = request.amount.unwrap_or(covered_subtotal);
        if !amount.is_positive() {
            return Err(RefundApiError::InvalidAmount);
        }
        let refundable = order.total_price - self.db.completed_refund_total(order.id).await?;
        if amount > refundable {
            return Err(RefundApiError::ExceedsRefundable { requested: amount, refundable });
        }
        let kind = if amount == order.total_price { RefundKind::Full } else { RefundKind::Partial };

        let refund = self
            .db
            .create_refund(NewRefund {
                order_id: order.id,
                amount,
                kind,
                reason: request.reason,
                owning_party,
                requested_by: request.requested_by,
            })
            .await?;
        info!("💸️ Refund #{} of {amount} against order {} filed for {owning_party}", refund.id, order.order_id);
        self.call_refund_settled_hook(&refund, RefundOutcome::Requested).await;
        Ok(refund)
    }

    /// Approve a pending refund and execute the processor reversal.
    ///
    /// Only the owning party may approve. The refund is moved to `Processing` before the processor call, so a
    /// crash mid-reversal leaves an in-flight record rather than a silent retry.
    pub async fn process_refund(
        &self,
        refund_id: i64,
        approver: &Principal,
        notes: Option<&str>,
    ) -> Result<Refund, RefundApiError> {
        let refund = self.fetch_owned_refund(refund_id, approver).await?;
        let order = self
            .db
            .order_by_pk(refund.order_id)
            .await?
            .ok_or(RefundApiError::Database(PaymentGatewayError::DatabaseError(format!(
                "Refund #{refund_id} references missing order row {}",
                refund.order_id
            ))))?;
        let Some(authorization_id) = order.authorization_id.clone() else {
            return Err(RefundApiError::InvalidState(format!(
                "Order {} has no authorization to reverse",
                order.order_id
            )));
        };

        let refund = self.db.begin_refund_processing(refund.id).await?;
        let request = ReversalRequest {
            authorization_id,
            amount: refund.amount,
            currency: order.currency.clone(),
            reference: format!("refund-{}", refund.id),
        };
        match self.processor.reverse(request).await {
            Ok(handle) => {
                let refund = self.db.complete_refund(refund.id, &handle.reversal_id, &approver.to_string(), notes).await?;
                info!(
                    "💸️ Refund #{} of {} against order {} completed as [{}]",
                    refund.id, refund.amount, order.order_id, handle.reversal_id
                );
                self.call_refund_settled_hook(&refund, RefundOutcome::Completed).await;
                Ok(refund)
            },
            Err(e) => {
                warn!("💸️ Reversal for refund #{} failed: {e}", refund.id);
                let refund = self.db.fail_refund(refund.id, &e.to_string()).await?;
                self.call_refund_settled_hook(&refund, RefundOutcome::Failed).await;
                Err(e.into())
            },
        }
    }

    /// Withdraw a pending refund. Only the owning party may cancel, and a reason is required.
    pub async fn cancel_refund(
        &self,
        refund_id: i64,
        principal: &Principal,
        reason: &str,
    ) -> Result<Refund, RefundApiError> {
        if reason.trim().is_empty() {
            return Err(RefundApiError::ReasonRequired);
        }
        let refund = self.fetch_owned_refund(refund_id, principal).await?;
        let refund = self.db.cancel_refund(refund.id, reason, &principal.to_string()).await?;
        info!("💸️ Refund #{} cancelled by {principal}", refund.id);
        self.call_refund_settled_hook(&refund, RefundOutcome::Cancelled).await;
        Ok(refund)
    }

    /// The refunds the given principal is allowed to see. The platform admin sees platform-owned refunds;
    /// a seller sees exactly their own.
    pub async fn refunds_visible_to(&self, principal: &Principal) -> Result<Vec<Refund>, RefundApiError> {
        let party = match principal {
            Principal::PlatformAdmin => OwningParty::Platform,
            Principal::Seller(id) => OwningParty::Seller(*id),
        };
        Ok(self.db.refunds_for_party(&party).await?)
    }

    /// Fetch a refund and verify that `principal` owns it. The ownership check runs before any state check so
    /// a non-owner learns nothing about the refund's state.
    async fn fetch_owned_refund(&self, refund_id: i64, principal: &Principal) -> Result<Refund, RefundApiError> {
        let refund = self.db.refund_by_id(refund_id).await?.ok_or(RefundApiError::RefundNotFound(refund_id))?;
        let owner = refund.owning_party().map_err(PaymentGatewayError::from)?;
        if !principal.owns(&owner) {
            debug!("💸️ {principal} tried to act on refund #{refund_id} owned by {owner}");
            return Err(RefundApiError::NotRefundOwner);
        }
        Ok(refund)
    }

    async fn call_refund_settled_hook(&self, refund: &Refund, outcome: RefundOutcome) {
        for producer in &self.producers.refund_settled_producer {
            producer.publish_event(RefundSettledEvent::new(refund.clone(), outcome)).await;
        }
    }
}
