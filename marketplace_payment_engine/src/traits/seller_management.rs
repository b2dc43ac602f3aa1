use crate::{
    db_types::{Product, Seller},
    traits::PaymentGatewayError,
};

/// Read-only lookups into the catalog/store collaborator's data. Catalog CRUD lives outside this system;
/// checkout only reads product and seller rows (and decrements stock through the inventory guard).
#[allow(async_fn_in_trait)]
pub trait SellerManagement: Clone {
    async fn seller_by_id(&self, seller_id: i64) -> Result<Option<Seller>, PaymentGatewayError>;

    /// Fetch the given sellers. Missing ids are simply absent from the result; callers that need every id
    /// present must check for themselves.
    async fn sellers_by_ids(&self, seller_ids: &[i64]) -> Result<Vec<Seller>, PaymentGatewayError>;

    async fn product_by_id(&self, product_id: i64) -> Result<Option<Product>, PaymentGatewayError>;
}
