use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTransfer, Transfer, TransferStatus},
    sqlite::SqliteDatabaseError,
};

const TRANSFER_COLUMNS: &str = "id, order_id, seller_id, amount, destination_account, attempts, status, last_error, \
                                processor_transfer_id, created_at, updated_at";

pub async fn insert_transfer(transfer: &NewTransfer, conn: &mut SqliteConnection) -> Result<i64, SqliteDatabaseError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO transfers (order_id, seller_id, amount, destination_account) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(transfer.order_id)
    .bind(transfer.seller_id)
    .bind(transfer.amount)
    .bind(&transfer.destination_account)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Transfer {id} of {} queued for seller {}", transfer.amount, transfer.seller_id);
    Ok(id)
}

pub async fn fetch_transfer(transfer_id: i64, conn: &mut SqliteConnection) -> Result<Option<Transfer>, SqliteDatabaseError> {
    let q = format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = ?");
    let transfer = sqlx::query_as::<_, Transfer>(&q).bind(transfer_id).fetch_optional(conn).await?;
    Ok(transfer)
}

pub async fn fetch_transfers_for_order(
    order_pk: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transfer>, SqliteDatabaseError> {
    let q = format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE order_id = ? ORDER BY id");
    let transfers = sqlx::query_as::<_, Transfer>(&q).bind(order_pk).fetch_all(conn).await?;
    Ok(transfers)
}

/// Every exhausted transfer, oldest first. This is the manual reconciliation queue; rows leave it only when a
/// human resolves them out of band, never by deletion.
pub async fn fetch_unresolved(conn: &mut SqliteConnection) -> Result<Vec<Transfer>, SqliteDatabaseError> {
    let q = format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE status = ? ORDER BY created_at");
    let transfers = sqlx::query_as::<_, Transfer>(&q).bind(TransferStatus::FailedExhausted).fetch_all(conn).await?;
    Ok(transfers)
}

pub async fn record_failure(
    transfer_id: i64,
    attempts: u32,
    error: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE transfers SET attempts = ?, last_error = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(attempts)
        .bind(error)
        .bind(transfer_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_succeeded(
    transfer_id: i64,
    attempts: u32,
    processor_transfer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let res = sqlx::query(
        "UPDATE transfers SET status = ?, attempts = ?, processor_transfer_id = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND status = ?",
    )
    .bind(TransferStatus::Succeeded)
    .bind(attempts)
    .bind(processor_transfer_id)
    .bind(transfer_id)
    .bind(TransferStatus::Pending)
    .execute(conn)
    .await?;
    if res.rows_affected() != 1 {
        return Err(SqliteDatabaseError::IllegalTransition(format!(
            "Transfer {transfer_id} is not pending and cannot succeed"
        )));
    }
    Ok(())
}

pub async fn mark_exhausted(
    transfer_id: i64,
    attempts: u32,
    error: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let res = sqlx::query(
        "UPDATE transfers SET status = ?, attempts = ?, last_error = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? \
         AND status = ?",
    )
    .bind(TransferStatus::FailedExhausted)
    .bind(attempts)
    .bind(error)
    .bind(transfer_id)
    .bind(TransferStatus::Pending)
    .execute(conn)
    .await?;
    if res.rows_affected() != 1 {
        return Err(SqliteDatabaseError::IllegalTransition(format!(
            "Transfer {transfer_id} is not pending and cannot be exhausted"
        )));
    }
    Ok(())
}
