pub mod orders;
pub mod products;
pub mod refunds;
pub mod sellers;
pub mod transfers;
