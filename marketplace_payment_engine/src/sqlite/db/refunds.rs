use log::trace;
use mpg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewRefund, OwningParty, Refund, RefundStatus},
    sqlite::SqliteDatabaseError,
};

const REFUND_COLUMNS: &str = "id, order_id, amount, kind, reason, owning_party, status, reversal_id, requested_by, \
                              processed_by, notes, last_error, created_at, updated_at";

pub async fn insert_refund(refund: &NewRefund, conn: &mut SqliteConnection) -> Result<i64, SqliteDatabaseError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO refunds (order_id, amount, kind, reason, owning_party, requested_by) VALUES (?, ?, ?, ?, ?, ?) \
         RETURNING id",
    )
    .bind(refund.order_id)
    .bind(refund.amount)
    .bind(refund.kind)
    .bind(&refund.reason)
    .bind(refund.owning_party.to_string())
    .bind(&refund.requested_by)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Refund {id} of {} created, owned by {}", refund.amount, refund.owning_party);
    Ok(id)
}

pub async fn fetch_refund(refund_id: i64, conn: &mut SqliteConnection) -> Result<Option<Refund>, SqliteDatabaseError> {
    let q = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE id = ?");
    let refund = sqlx::query_as::<_, Refund>(&q).bind(refund_id).fetch_optional(conn).await?;
    Ok(refund)
}

pub async fn fetch_refunds_for_order(
    order_pk: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Refund>, SqliteDatabaseError> {
    let q = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE order_id = ? ORDER BY id");
    let refunds = sqlx::query_as::<_, Refund>(&q).bind(order_pk).fetch_all(conn).await?;
    Ok(refunds)
}

/// The refund visibility boundary: everything a dashboard or refund action may see for `party` flows through
/// this predicate.
pub async fn fetch_refunds_for_party(
    party: &OwningParty,
    conn: &mut SqliteConnection,
) -> Result<Vec<Refund>, SqliteDatabaseError> {
    let q = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE owning_party = ? ORDER BY id");
    let refunds = sqlx::query_as::<_, Refund>(&q).bind(party.to_string()).fetch_all(conn).await?;
    Ok(refunds)
}

pub async fn completed_total(order_pk: i64, conn: &mut SqliteConnection) -> Result<Money, SqliteDatabaseError> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE order_id = ? AND status = ?",
    )
    .bind(order_pk)
    .bind(RefundStatus::Completed)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(total))
}

/// The number of refunds against the order that are still in flight (`Pending` or `Processing`).
pub async fn open_refund_count(order_pk: i64, conn: &mut SqliteConnection) -> Result<i64, SqliteDatabaseError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM refunds WHERE order_id = ? AND status IN (?, ?)",
    )
    .bind(order_pk)
    .bind(RefundStatus::Pending)
    .bind(RefundStatus::Processing)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

/// Conditional status transition; fails without touching the row unless the refund is currently in `from`.
/// The legal moves are pending→processing, processing→completed, processing→failed and pending→cancelled;
/// everything else is an illegal transition by construction.
async fn transition(
    refund_id: i64,
    from: RefundStatus,
    to: RefundStatus,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let res = sqlx::query("UPDATE refunds SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status = ?")
        .bind(to)
        .bind(refund_id)
        .bind(from)
        .execute(conn)
        .await?;
    if res.rows_affected() != 1 {
        return Err(SqliteDatabaseError::IllegalTransition(format!(
            "Refund {refund_id} is not {from} and cannot move to {to}"
        )));
    }
    trace!("🗃️ Refund {refund_id} moved from {from} to {to}");
    Ok(())
}

pub async fn mark_processing(refund_id: i64, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    transition(refund_id, RefundStatus::Pending, RefundStatus::Processing, conn).await
}

pub async fn mark_completed(
    refund_id: i64,
    reversal_id: &str,
    processed_by: &str,
    notes: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    transition(refund_id, RefundStatus::Processing, RefundStatus::Completed, conn).await?;
    sqlx::query("UPDATE refunds SET reversal_id = ?, processed_by = ?, notes = ? WHERE id = ?")
        .bind(reversal_id)
        .bind(processed_by)
        .bind(notes)
        .bind(refund_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_failed(refund_id: i64, error: &str, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    transition(refund_id, RefundStatus::Processing, RefundStatus::Failed, conn).await?;
    sqlx::query("UPDATE refunds SET last_error = ? WHERE id = ?").bind(error).bind(refund_id).execute(conn).await?;
    Ok(())
}

pub async fn mark_cancelled(
    refund_id: i64,
    reason: &str,
    cancelled_by: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    transition(refund_id, RefundStatus::Pending, RefundStatus::Cancelled, conn).await?;
    sqlx::query("UPDATE refunds SET notes = ?, processed_by = ? WHERE id = ?")
        .bind(reason)
        .bind(cancelled_by)
        .bind(refund_id)
        .execute(conn)
        .await?;
    Ok(())
}
