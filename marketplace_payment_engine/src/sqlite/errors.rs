use thiserror::Error;

use crate::{db_types::OrderId, traits::PaymentGatewayError};

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("No order matches authorization '{0}'")]
    AuthorizationNotFound(String),
    #[error("Product {0} not found")]
    ProductNotFound(i64),
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: i64 },
    #[error("Transfer {0} not found")]
    TransferNotFound(i64),
    #[error("Refund {0} not found")]
    RefundNotFound(i64),
    #[error("Illegal state transition: {0}")]
    IllegalTransition(String),
}

impl From<SqliteDatabaseError> for PaymentGatewayError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::OrderNotFound(id) => PaymentGatewayError::OrderNotFound(id),
            SqliteDatabaseError::AuthorizationNotFound(id) => PaymentGatewayError::AuthorizationNotFound(id),
            SqliteDatabaseError::ProductNotFound(id) => PaymentGatewayError::ProductNotFound(id),
            SqliteDatabaseError::InsufficientStock { product_id } => PaymentGatewayError::InsufficientStock { product_id },
            SqliteDatabaseError::TransferNotFound(id) => PaymentGatewayError::TransferNotFound(id),
            SqliteDatabaseError::RefundNotFound(id) => PaymentGatewayError::RefundNotFound(id),
            SqliteDatabaseError::IllegalTransition(msg) => PaymentGatewayError::IllegalStateTransition(msg),
            e => PaymentGatewayError::DatabaseError(e.to_string()),
        }
    }
}
