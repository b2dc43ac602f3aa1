use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::Product, sqlite::SqliteDatabaseError};

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, SqliteDatabaseError> {
    let product = sqlx::query_as::<_, Product>("SELECT id, name, seller_id, price, stock FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(product)
}

/// The inventory guard's check-and-decrement. The quantity guard lives in the WHERE clause, so under SQLite's
/// write serialization two concurrent reservations can never both pass when their combined quantity exceeds
/// the available stock: the second UPDATE simply matches no row.
pub async fn reserve_stock(product_id: i64, quantity: i64, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let res = sqlx::query("UPDATE products SET stock = stock - ? WHERE id = ? AND stock >= ?")
        .bind(quantity)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
    if res.rows_affected() != 1 {
        // a miss is either an oversell or a product that does not exist; tell them apart
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(conn)
            .await?;
        if exists == 0 {
            return Err(SqliteDatabaseError::ProductNotFound(product_id));
        }
        return Err(SqliteDatabaseError::InsufficientStock { product_id });
    }
    trace!("🗃️ Reserved {quantity} units of product {product_id}");
    Ok(())
}

pub async fn restore_stock(product_id: i64, quantity: i64, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE products SET stock = stock + ? WHERE id = ?")
        .bind(quantity)
        .bind(product_id)
        .execute(conn)
        .await?;
    trace!("🗃️ Restored {quantity} units of product {product_id}");
    Ok(())
}
