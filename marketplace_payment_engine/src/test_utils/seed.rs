//! Catalog seed data. Catalog CRUD is not part of the engine's surface, so tests insert sellers and
//! products directly.
//!
//! Seeding runs in an explicit committed transaction so the row is visible to whichever pooled connection
//! the test grabs next.

use mpg_common::Money;
use sqlx::SqlitePool;

use crate::db_types::OnboardingStatus;

pub async fn seed_seller(pool: &SqlitePool, name: &str, payout_account: &str, status: OnboardingStatus) -> i64 {
    let mut tx = pool.begin().await.expect("Error starting seed transaction");
    let id = sqlx::query_scalar(
        r#"INSERT INTO sellers (name, payout_account, onboarding_status) VALUES ($1, $2, $3) RETURNING id"#,
    )
    .bind(name)
    .bind(payout_account)
    .bind(status)
    .fetch_one(&mut *tx)
    .await
    .expect("Error seeding seller");
    tx.commit().await.expect("Error committing seed transaction");
    id
}

pub async fn seed_product(pool: &SqlitePool, name: &str, seller_id: Option<i64>, price: Money, stock: i64) -> i64 {
    let mut tx = pool.begin().await.expect("Error starting seed transaction");
    let id = sqlx::query_scalar(r#"INSERT INTO products (name, seller_id, price, stock) VALUES ($1, $2, $3, $4) RETURNING id"#)
        .bind(name)
        .bind(seller_id)
        .bind(price)
        .bind(stock)
        .fetch_one(&mut *tx)
        .await
        .expect("Error seeding product");
    tx.commit().await.expect("Error committing seed transaction");
    id
}
