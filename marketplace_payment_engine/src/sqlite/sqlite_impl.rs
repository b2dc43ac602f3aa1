//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module. Transaction boundaries live here: the per-entity modules in [`super::db`] operate
//! on a plain connection and are composed into atomic units by this facade.

use std::fmt::Debug;

use log::*;
use mpg_common::Money;
use sqlx::SqlitePool;

use super::db::{orders, products, refunds, sellers, transfers};
use crate::{
    db_types::{
        NewOrder,
        NewOrderLine,
        NewRefund,
        NewTransfer,
        Order,
        OrderId,
        OrderLine,
        OrderStatusType,
        OwningParty,
        Product,
        Refund,
        Seller,
        Transfer,
    },
    sqlite::{db_url, new_pool, SqliteDatabaseError},
    traits::{OrderManagement, PaymentGatewayDatabase, PaymentGatewayError, SellerManagement},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order_with_reservation(
        &self,
        order: NewOrder,
        lines: Vec<NewOrderLine>,
    ) -> Result<(Order, bool), PaymentGatewayError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        if let Some(existing) = orders::fetch_order_by_order_id(&order.order_id, &mut tx).await? {
            debug!("🗃️ Order {} already exists with row id {}. Stock is untouched.", order.order_id, existing.id);
            return Ok((existing, false));
        }
        for line in &lines {
            products::reserve_stock(line.product_id, line.quantity, &mut tx).await?;
        }
        let pk = orders::insert_order(&order, &mut tx).await?;
        orders::insert_lines(pk, &lines, &mut tx).await?;
        let stored = orders::fetch_order_by_pk(pk, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order.order_id.clone()))?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        debug!("🗃️ Order {} saved with row id {pk}. Stock reserved for {} lines.", order.order_id, lines.len());
        Ok((stored, true))
    }

    async fn attach_authorization(
        &self,
        order_id: &OrderId,
        authorization_id: &str,
    ) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        orders::attach_authorization(order.id, authorization_id, &mut conn).await?;
        debug!("🗃️ Order {order_id} linked to authorization [{authorization_id}]");
        let order = orders::fetch_order_by_pk(order.id, &mut conn)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        Ok(order)
    }

    async fn cancel_unpaid_order(&self, order_id: &OrderId, reason: &str) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        let moved =
            orders::transition_order_status(order.id, OrderStatusType::Pending, OrderStatusType::Cancelled, &mut tx)
                .await?;
        if !moved {
            return Err(PaymentGatewayError::IllegalStateTransition(format!(
                "Order {order_id} is {} and cannot be cancelled",
                order.status
            )));
        }
        let lines = orders::fetch_lines(order.id, &mut tx).await?;
        for line in &lines {
            products::restore_stock(line.product_id, line.quantity, &mut tx).await?;
        }
        let order = orders::fetch_order_by_pk(order.id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        info!("🗃️ Order {order_id} cancelled ({reason}). Stock restored for {} lines.", lines.len());
        Ok(order)
    }

    async fn confirm_capture(&self, authorization_id: &str) -> Result<Option<Order>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let order = orders::fetch_order_by_authorization(authorization_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::AuthorizationNotFound(authorization_id.to_string()))?;
        match order.status {
            OrderStatusType::Pending => {},
            OrderStatusType::Cancelled => {
                // A capture confirmation for an order we already cancelled is money in limbo. Fail loudly;
                // this needs a human.
                return Err(PaymentGatewayError::IllegalStateTransition(format!(
                    "Capture confirmed for cancelled order {}",
                    order.order_id
                )));
            },
            _ => {
                debug!("🗃️ Capture for order {} re-delivered. No action to take.", order.order_id);
                return Ok(None);
            },
        }
        orders::update_order_status(order.id, OrderStatusType::Paid, &mut tx).await?;
        let order = orders::fetch_order_by_pk(order.id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::AuthorizationNotFound(authorization_id.to_string()))?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        debug!("🗃️ Order {} marked as paid on capture [{authorization_id}]", order.order_id);
        Ok(Some(order))
    }

    async fn create_transfers(&self, new_transfers: Vec<NewTransfer>) -> Result<Vec<Transfer>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let mut result = Vec::with_capacity(new_transfers.len());
        for transfer in &new_transfers {
            let id = transfers::insert_transfer(transfer, &mut tx).await?;
            let stored =
                transfers::fetch_transfer(id, &mut tx).await?.ok_or(PaymentGatewayError::TransferNotFound(id))?;
            result.push(stored);
        }
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(result)
    }

    async fn record_transfer_failure(
        &self,
        transfer_id: i64,
        attempts: u32,
        error: &str,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        transfers::record_failure(transfer_id, attempts, error, &mut conn).await?;
        Ok(())
    }

    async fn transfer_succeeded(
        &self,
        transfer_id: i64,
        attempts: u32,
        processor_transfer_id: &str,
    ) -> Result<Transfer, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        transfers::mark_succeeded(transfer_id, attempts, processor_transfer_id, &mut conn).await?;
        let transfer = transfers::fetch_transfer(transfer_id, &mut conn)
            .await?
            .ok_or(PaymentGatewayError::TransferNotFound(transfer_id))?;
        Ok(transfer)
    }

    async fn transfer_exhausted(
        &self,
        transfer_id: i64,
        attempts: u32,
        error: &str,
    ) -> Result<Transfer, PaymentGatewayError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let transfer = transfers::fetch_transfer(transfer_id, &mut tx)
            .await?
            .ok_or(PaymentGatewayError::TransferNotFound(transfer_id))?;
        transfers::mark_exhausted(transfer_id, attempts, error, &mut tx).await?;
        orders::flag_for_reconciliation(transfer.order_id, &mut tx).await?;
        let transfer = transfers::fetch_transfer(transfer_id, &mut tx)
            .await?
            .ok_or(PaymentGatewayError::TransferNotFound(transfer_id))?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        warn!(
            "🗃️ Transfer {transfer_id} exhausted after {attempts} attempts. Order row {} flagged for manual \
             reconciliation.",
            transfer.order_id
        );
        Ok(transfer)
    }

    async fn create_refund(&self, refund: NewRefund) -> Result<Refund, PaymentGatewayError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let id = refunds::insert_refund(&refund, &mut tx).await?;
        // Paid -> RefundRequested; if another refund already moved it, leave the status alone
        let _ = orders::transition_order_status(
            refund.order_id,
            OrderStatusType::Paid,
            OrderStatusType::RefundRequested,
            &mut tx,
        )
        .await?;
        let stored = refunds::fetch_refund(id, &mut tx).await?.ok_or(PaymentGatewayError::RefundNotFound(id))?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(stored)
    }

    async fn completed_refund_total(&self, order_pk: i64) -> Result<Money, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let total = refunds::completed_total(order_pk, &mut conn).await?;
        Ok(total)
    }

    async fn begin_refund_processing(&self, refund_id: i64) -> Result<Refund, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        refunds::mark_processing(refund_id, &mut conn).await?;
        let refund = refunds::fetch_refund(refund_id, &mut conn)
            .await?
            .ok_or(PaymentGatewayError::RefundNotFound(refund_id))?;
        Ok(refund)
    }

    async fn complete_refund(
        &self,
        refund_id: i64,
        reversal_id: &str,
        processed_by: &str,
        notes: Option<&str>,
    ) -> Result<Refund, PaymentGatewayError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        refunds::mark_completed(refund_id, reversal_id, processed_by, notes, &mut tx).await?;
        let refund = refunds::fetch_refund(refund_id, &mut tx)
            .await?
            .ok_or(PaymentGatewayError::RefundNotFound(refund_id))?;
        let order = orders::fetch_order_by_pk(refund.order_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::DatabaseError(format!("Refund {refund_id} has no order")))?;
        let refunded = refunds::completed_total(refund.order_id, &mut tx).await?;
        if refunded >= order.total_price {
            orders::update_order_status(order.id, OrderStatusType::Refunded, &mut tx).await?;
            info!("🗃️ Order {} is now fully refunded", order.order_id);
        }
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(refund)
    }

    async fn fail_refund(&self, refund_id: i64, error: &str) -> Result<Refund, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        refunds::mark_failed(refund_id, error, &mut conn).await?;
        let refund = refunds::fetch_refund(refund_id, &mut conn)
            .await?
            .ok_or(PaymentGatewayError::RefundNotFound(refund_id))?;
        Ok(refund)
    }

    async fn cancel_refund(
        &self,
        refund_id: i64,
        reason: &str,
        cancelled_by: &str,
    ) -> Result<Refund, PaymentGatewayError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        refunds::mark_cancelled(refund_id, reason, cancelled_by, &mut tx).await?;
        let refund = refunds::fetch_refund(refund_id, &mut tx)
            .await?
            .ok_or(PaymentGatewayError::RefundNotFound(refund_id))?;
        if refunds::open_refund_count(refund.order_id, &mut tx).await? == 0 {
            // no open refunds remain; the order is a plain paid order again
            let _ = orders::transition_order_status(
                refund.order_id,
                OrderStatusType::RefundRequested,
                OrderStatusType::Paid,
                &mut tx,
            )
            .await?;
        }
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(refund)
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    async fn order_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(orders::fetch_order_by_order_id(order_id, &mut conn).await?)
    }

    async fn order_by_pk(&self, order_pk: i64) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(orders::fetch_order_by_pk(order_pk, &mut conn).await?)
    }

    async fn order_by_authorization(&self, authorization_id: &str) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(orders::fetch_order_by_authorization(authorization_id, &mut conn).await?)
    }

    async fn lines_for_order(&self, order_pk: i64) -> Result<Vec<OrderLine>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(orders::fetch_lines(order_pk, &mut conn).await?)
    }

    async fn transfer_by_id(&self, transfer_id: i64) -> Result<Option<Transfer>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(transfers::fetch_transfer(transfer_id, &mut conn).await?)
    }

    async fn transfers_for_order(&self, order_pk: i64) -> Result<Vec<Transfer>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(transfers::fetch_transfers_for_order(order_pk, &mut conn).await?)
    }

    async fn unresolved_transfers(&self) -> Result<Vec<Transfer>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(transfers::fetch_unresolved(&mut conn).await?)
    }

    async fn refund_by_id(&self, refund_id: i64) -> Result<Option<Refund>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(refunds::fetch_refund(refund_id, &mut conn).await?)
    }

    async fn refunds_for_order(&self, order_pk: i64) -> Result<Vec<Refund>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(refunds::fetch_refunds_for_order(order_pk, &mut conn).await?)
    }

    async fn refunds_for_party(&self, party: &OwningParty) -> Result<Vec<Refund>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(refunds::fetch_refunds_for_party(party, &mut conn).await?)
    }
}

impl SellerManagement for SqliteDatabase {
    async fn seller_by_id(&self, seller_id: i64) -> Result<Option<Seller>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(sellers::fetch_seller(seller_id, &mut conn).await?)
    }

    async fn sellers_by_ids(&self, seller_ids: &[i64]) -> Result<Vec<Seller>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(sellers::fetch_sellers(seller_ids, &mut conn).await?)
    }

    async fn product_by_id(&self, product_id: i64) -> Result<Option<Product>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(products::fetch_product(product_id, &mut conn).await?)
    }
}
