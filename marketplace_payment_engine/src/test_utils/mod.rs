//! Helpers for setting up test environments: throwaway databases, catalog seed data, and a scriptable
//! payment processor stand-in.

pub mod prepare_env;
pub mod processor;
pub mod seed;

pub use prepare_env::{create_database, prepare_test_env, random_db_path, run_migrations};
pub use processor::StubProcessor;
pub use seed::{seed_product, seed_seller};
