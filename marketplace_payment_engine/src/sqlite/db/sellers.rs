use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{db_types::Seller, sqlite::SqliteDatabaseError};

const SELLER_COLUMNS: &str = "id, name, payout_account, onboarding_status, created_at";

pub async fn fetch_seller(seller_id: i64, conn: &mut SqliteConnection) -> Result<Option<Seller>, SqliteDatabaseError> {
    let q = format!("SELECT {SELLER_COLUMNS} FROM sellers WHERE id = ?");
    let seller = sqlx::query_as::<_, Seller>(&q).bind(seller_id).fetch_optional(conn).await?;
    Ok(seller)
}

pub async fn fetch_sellers(seller_ids: &[i64], conn: &mut SqliteConnection) -> Result<Vec<Seller>, SqliteDatabaseError> {
    if seller_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {SELLER_COLUMNS} FROM sellers WHERE id IN ("));
    let mut separated = builder.separated(", ");
    for id in seller_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") ORDER BY id");
    let sellers = builder.build_query_as::<Seller>().fetch_all(conn).await?;
    Ok(sellers)
}
