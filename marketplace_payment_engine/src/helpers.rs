use blake2::{Blake2b512, Digest};

use crate::db_types::OrderId;

/// Derive the processor idempotency key for an order's authorization.
///
/// The key is a pure function of the order id, so a client retry after a network timeout presents the same
/// key and the processor deduplicates the charge. The domain prefix keeps authorization keys from ever
/// colliding with keys derived for other purposes.
pub fn authorization_idempotency_key(order_id: &OrderId) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(b"mpg.authorize.v1:");
    hasher.update(order_id.as_str().as_bytes());
    let hash = hasher.finalize();
    hash.iter().take(16).fold(String::with_capacity(32), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
