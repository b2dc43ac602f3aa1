use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, NewOrderLine, Order, OrderId, OrderLine, OrderStatusType},
    sqlite::SqliteDatabaseError,
};

const ORDER_COLUMNS: &str = "id, order_id, customer_id, session_id, contact_name, contact_email, contact_address, \
                             total_price, currency, topology, authorization_id, status, needs_reconciliation, \
                             created_at, updated_at";

/// Inserts a new order row in `Pending` status. Not atomic on its own; callers embed this in the reservation
/// transaction and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<i64, SqliteDatabaseError> {
    let rec = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO orders (
            order_id, customer_id, session_id, contact_name, contact_email, contact_address,
            total_price, currency, topology
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.customer_id)
    .bind(&order.session_id)
    .bind(&order.contact.name)
    .bind(&order.contact.email)
    .bind(&order.contact.address)
    .bind(order.total_price)
    .bind(&order.currency)
    .bind(order.topology)
    .fetch_one(conn)
    .await?;
    Ok(rec)
}

pub async fn insert_lines(
    order_pk: i64,
    lines: &[NewOrderLine],
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    for line in lines {
        sqlx::query(
            "INSERT INTO order_lines (order_id, product_id, seller_id, unit_price, quantity) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_pk)
        .bind(line.product_id)
        .bind(line.seller_id)
        .bind(line.unit_price)
        .bind(line.quantity)
        .execute(&mut *conn)
        .await?;
    }
    trace!("🗃️ {} line snapshots saved for order row {order_pk}", lines.len());
    Ok(())
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let q = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ? LIMIT 1");
    let order = sqlx::query_as::<_, Order>(&q).bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_pk(order_pk: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, SqliteDatabaseError> {
    let q = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ? LIMIT 1");
    let order = sqlx::query_as::<_, Order>(&q).bind(order_pk).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_authorization(
    authorization_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let q = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE authorization_id = ? LIMIT 1");
    let order = sqlx::query_as::<_, Order>(&q).bind(authorization_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_lines(order_pk: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, SqliteDatabaseError> {
    let lines = sqlx::query_as::<_, OrderLine>(
        "SELECT id, order_id, product_id, seller_id, unit_price, quantity FROM order_lines WHERE order_id = ? ORDER \
         BY id",
    )
    .bind(order_pk)
    .fetch_all(conn)
    .await?;
    Ok(lines)
}

pub async fn attach_authorization(
    order_pk: i64,
    authorization_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE orders SET authorization_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(authorization_id)
        .bind(order_pk)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_order_status(
    order_pk: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE orders SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(status)
        .bind(order_pk)
        .execute(conn)
        .await?;
    trace!("🗃️ Order row {order_pk} is now {status}");
    Ok(())
}

/// Conditional status transition. Returns `false` (without touching the row) if the order is not currently in
/// `from` status.
pub async fn transition_order_status(
    order_pk: i64,
    from: OrderStatusType,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query("UPDATE orders SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status = ?")
        .bind(to)
        .bind(order_pk)
        .bind(from)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn flag_for_reconciliation(order_pk: i64, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE orders SET needs_reconciliation = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(order_pk)
        .execute(conn)
        .await?;
    Ok(())
}
