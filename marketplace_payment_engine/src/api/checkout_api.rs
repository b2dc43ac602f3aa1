use std::{fmt::Debug, time::Duration};

use log::*;
use mpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{DeliveryContact, NewOrder, NewOrderLine, Order, OrderId},
    helpers::authorization_idempotency_key,
    planner::{FeeSpec, PlanError, SettlementPlanner},
    traits::{AuthorizationRequest, PaymentGatewayDatabase, PaymentGatewayError, PaymentProcessor, ProcessorError},
};

pub const DEFAULT_AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("Invalid checkout request: {0}")]
    Validation(String),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: i64 },
    #[error("Product {0} not found")]
    ProductNotFound(i64),
    #[error("Payment authorization failed: {0}")]
    Processor(#[from] ProcessorError),
    #[error("Database error: {0}")]
    Database(PaymentGatewayError),
}

impl From<PaymentGatewayError> for CheckoutError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::InsufficientStock { product_id } => CheckoutError::InsufficientStock { product_id },
            PaymentGatewayError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
            e => CheckoutError::Database(e),
        }
    }
}

/// One cart entry as submitted by the storefront. Price and ownership are *not* part of the submission; they
/// are snapshotted from the catalog at checkout time.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// The storefront's checkout reference, which doubles as the reservation key.
    pub order_id: OrderId,
    pub customer_id: Option<String>,
    pub session_id: Option<String>,
    pub contact: DeliveryContact,
    pub lines: Vec<CartLine>,
}

/// `CheckoutApi` runs the checkout pipeline: validate, snapshot the cart against the catalog, plan the
/// settlement, reserve stock and persist the order in one atomic transaction, then authorize payment.
///
/// The processor call is made strictly *after* the reservation transaction commits; the two are joined by the
/// authorization handle, never by a shared database transaction.
pub struct CheckoutApi<B, P> {
    db: B,
    processor: P,
    planner: SettlementPlanner,
    authorization_timeout: Duration,
}

impl<B, P> Debug for CheckoutApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, P> CheckoutApi<B, P>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
{
    pub fn new(db: B, processor: P, planner: SettlementPlanner) -> Self {
        Self { db, processor, planner, authorization_timeout: DEFAULT_AUTHORIZATION_TIMEOUT }
    }

    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = timeout;
        self
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

    /// Run a checkout end to end. On success the returned order is `Pending` with an authorization attached;
    /// it becomes `Paid` only when the processor's capture confirmation arrives.
    ///
    /// Everything that can reject the checkout (validation, onboarding, stock) happens before any money
    /// moves; a declined authorization rolls the reservation back in a second atomic transaction and leaves
    /// no partial state behind.
    pub async fn process_checkout(&self, request: CheckoutRequest) -> Result<Order, CheckoutError> {
        request.contact.validate().map_err(CheckoutError::Validation)?;
        if request.lines.is_empty() {
            return Err(CheckoutError::Validation("The cart is empty".to_string()));
        }

        let lines = self.snapshot_lines(&request.lines).await?;
        let seller_ids = distinct_seller_ids(&lines);
        let sellers = self.db.sellers_by_ids(&seller_ids).await?;
        let plan = self.planner.plan(&lines, &sellers)?;
        debug!(
            "🛒️ Order {} planned as {} for {} across {} lines",
            request.order_id,
            plan.topology,
            plan.total,
            lines.len()
        );

        let mut new_order = NewOrder::new(request.order_id.clone(), request.contact, plan.total, plan.topology);
        new_order.customer_id = request.customer_id;
        new_order.session_id = request.session_id;
        let (order, inserted) = self.db.create_order_with_reservation(new_order, lines).await?;
        if !inserted {
            if order.authorization_id.is_some() {
                debug!("🛒️ Order {} re-submitted after authorization. Returning the stored order.", order.order_id);
                return Ok(order);
            }
            // stored but never authorized (e.g. crash between commit and processor call); authorize against
            // the stored snapshot, not today's catalog
            debug!("🛒️ Order {} re-submitted before authorization. Retrying authorization.", order.order_id);
            let fee_spec = self.stored_fee_spec(&order).await?;
            let total = order.total_price;
            return self.authorize_order(order, fee_spec, total).await;
        }

        self.authorize_order(order, plan.fee_spec, plan.total).await
    }

    /// Rebuild the fee spec of a stored order from its snapshotted lines. A resubmitted order is authorized
    /// for the terms it was persisted with, whatever the catalog says today.
    async fn stored_fee_spec(&self, order: &Order) -> Result<FeeSpec, CheckoutError> {
        let lines = self
            .db
            .lines_for_order(order.id)
            .await?
            .into_iter()
            .map(|l| NewOrderLine {
                product_id: l.product_id,
                seller_id: l.seller_id,
                unit_price: l.unit_price,
                quantity: l.quantity,
            })
            .collect::<Vec<_>>();
        let sellers = self.db.sellers_by_ids(&distinct_seller_ids(&lines)).await?;
        let plan = self.planner.plan(&lines, &sellers)?;
        Ok(plan.fee_spec)
    }

    async fn authorize_order(&self, order: Order, fee_spec: FeeSpec, total: Money) -> Result<Order, CheckoutError> {
        let idempotency_key = authorization_idempotency_key(&order.order_id);
        let request = AuthorizationRequest {
            amount: total,
            currency: order.currency.clone(),
            idempotency_key: idempotency_key.clone(),
            fee_spec,
            timeout: self.authorization_timeout,
        };
        match self.processor.authorize(request).await {
            Ok(handle) => {
                let order = self.db.attach_authorization(&order.order_id, &handle.authorization_id).await?;
                info!("🛒️ Order {} authorized as [{}]", order.order_id, handle.authorization_id);
                Ok(order)
            },
            Err(ProcessorError::Timeout(d)) => {
                // The processor may have executed the charge despite the timed-out response. Reconcile via
                // the idempotency key before declaring failure.
                warn!("🛒️ Authorization for order {} timed out after {d:?}. Reconciling.", order.order_id);
                match self.processor.lookup_authorization(&idempotency_key).await {
                    Ok(Some(handle)) => {
                        let order = self.db.attach_authorization(&order.order_id, &handle.authorization_id).await?;
                        info!("🛒️ Order {} was authorized as [{}] despite the timeout", order.order_id, handle.authorization_id);
                        Ok(order)
                    },
                    Ok(None) => {
                        let _ = self.db.cancel_unpaid_order(&order.order_id, "authorization timed out").await?;
                        Err(ProcessorError::Timeout(d).into())
                    },
                    Err(e) => {
                        // can't tell whether the charge went through; keep the pending order and its
                        // reservation for a later reconciliation pass rather than risk cancelling a paid order
                        error!(
                            "🛒️ Could not reconcile timed-out authorization for order {}: {e}. The order stays \
                             pending.",
                            order.order_id
                        );
                        Err(ProcessorError::Timeout(d).into())
                    },
                }
            },
            Err(e) => {
                let _ = self.db.cancel_unpaid_order(&order.order_id, &format!("authorization failed: {e}")).await?;
                Err(e.into())
            },
        }
    }

    /// Snapshot cart lines against the live catalog: price and seller are captured here, once, and never
    /// recomputed from the product record again.
    async fn snapshot_lines(&self, cart: &[CartLine]) -> Result<Vec<NewOrderLine>, CheckoutError> {
        let mut lines = Vec::with_capacity(cart.len());
        for entry in cart {
            if entry.quantity <= 0 {
                return Err(CheckoutError::Validation(format!(
                    "Quantity {} for product {} is not positive",
                    entry.quantity, entry.product_id
                )));
            }
            let product = self
                .db
                .product_by_id(entry.product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(entry.product_id))?;
            lines.push(NewOrderLine {
                product_id: product.id,
                seller_id: product.seller_id,
                unit_price: product.price,
                quantity: entry.quantity,
            });
        }
        Ok(lines)
    }
}

fn distinct_seller_ids(lines: &[NewOrderLine]) -> Vec<i64> {
    let mut ids = lines.iter().filter_map(|l| l.seller_id).collect::<Vec<_>>();
    ids.sort_unstable();
    ids.dedup();
    ids
}
