//! End-to-end checkout tests against a throwaway SQLite database and a scripted processor.

use std::time::Duration;

use log::*;
use marketplace_payment_engine::{
    db_types::{DeliveryContact, NewOrder, NewOrderLine, OnboardingStatus, OrderId, OrderStatusType, SettlementTopology},
    planner::{FeeSpec, SettlementPlanner},
    test_utils::{prepare_test_env, random_db_path, seed_product, seed_seller, StubProcessor},
    traits::{AuthorizationHandle, PaymentGatewayError, ProcessorError},
    CheckoutApi,
    CheckoutError,
    CheckoutRequest,
    OrderManagement,
    PaymentGatewayDatabase,
    SellerManagement,
    SqliteDatabase,
};
use mpg_common::{CommissionRate, Money};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

async fn setup() -> CheckoutApi<SqliteDatabase, StubProcessor> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let processor = StubProcessor::new();
    let planner = SettlementPlanner::new(CommissionRate::default());
    CheckoutApi::new(db, processor, planner)
}

async fn tear_down(mut api: CheckoutApi<SqliteDatabase, StubProcessor>) {
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

fn contact() -> DeliveryContact {
    DeliveryContact {
        name: "Alice Example".to_string(),
        email: "alice@example.com".to_string(),
        address: "1 Main St, Springfield".to_string(),
    }
}

fn request(order_id: &str, lines: Vec<marketplace_payment_engine::CartLine>) -> CheckoutRequest {
    CheckoutRequest {
        order_id: OrderId::from(order_id.to_string()),
        customer_id: Some("cust-1".to_string()),
        session_id: None,
        contact: contact(),
        lines,
    }
}

fn cart_line(product_id: i64, quantity: i64) -> marketplace_payment_engine::CartLine {
    marketplace_payment_engine::CartLine { product_id, quantity }
}

#[test]
fn multi_party_checkout_authorizes_and_reserves() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let s1 = seed_seller(&pool, "Crafts by A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(&pool, "platform mug", None, Money::from(5_000), 10).await;
        let p2 = seed_product(&pool, "handmade bowl", Some(s1), Money::from(5_000), 4).await;

        let order = api
            .process_checkout(request("mp-0001", vec![cart_line(p1, 1), cart_line(p2, 1)]))
            .await
            .expect("Error processing checkout");
        assert_eq!(order.status, OrderStatusType::Pending);
        assert_eq!(order.topology, SettlementTopology::MultiParty);
        assert_eq!(order.total_price, Money::from(10_000));
        assert!(order.authorization_id.is_some());

        // stock reserved at checkout, not capture
        let product = api.db().product_by_id(p2).await.unwrap().unwrap();
        assert_eq!(product.stock, 3);

        let calls = api.processor().authorize_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].amount, Money::from(10_000));
        assert_eq!(calls[0].fee_spec, FeeSpec::PlatformCharge);
        tear_down(api).await;
    });
}

#[test]
fn single_seller_checkout_uses_destination_charge() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let s1 = seed_seller(&pool, "Crafts by A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(&pool, "handmade bowl", Some(s1), Money::from(2_500), 8).await;

        let order = api.process_checkout(request("ss-0001", vec![cart_line(p1, 4)])).await.unwrap();
        assert_eq!(order.topology, SettlementTopology::SingleSeller);
        assert_eq!(order.total_price, Money::from(10_000));

        let calls = api.processor().authorize_calls();
        assert_eq!(calls[0].fee_spec, FeeSpec::DestinationCharge {
            destination: "acct_a".to_string(),
            application_fee: Money::from(1_000),
        });
        tear_down(api).await;
    });
}

#[test]
fn declined_authorization_cancels_and_restores_stock() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let p1 = seed_product(&pool, "platform mug", None, Money::from(5_000), 10).await;
        api.processor().script_authorize(Err(ProcessorError::Declined("card declined".to_string())));

        let err = api.process_checkout(request("dec-0001", vec![cart_line(p1, 2)])).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Processor(ProcessorError::Declined(_))));

        let order_id = OrderId::from("dec-0001".to_string());
        let order = api.db().order_by_id(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Cancelled);
        let product = api.db().product_by_id(p1).await.unwrap().unwrap();
        assert_eq!(product.stock, 10);
        tear_down(api).await;
    });
}

#[test]
fn insufficient_stock_aborts_the_whole_checkout() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let p1 = seed_product(&pool, "plentiful", None, Money::from(1_000), 100).await;
        let p2 = seed_product(&pool, "scarce", None, Money::from(1_000), 1).await;

        let err = api.process_checkout(request("oos-0001", vec![cart_line(p1, 5), cart_line(p2, 2)])).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { product_id } if product_id == p2));

        // nothing persisted, nothing charged, first line's reservation rolled back
        let order_id = OrderId::from("oos-0001".to_string());
        assert!(api.db().order_by_id(&order_id).await.unwrap().is_none());
        assert_eq!(api.db().product_by_id(p1).await.unwrap().unwrap().stock, 100);
        assert!(api.processor().authorize_calls().is_empty());
        tear_down(api).await;
    });
}

#[test]
fn resubmitted_order_id_is_idempotent() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let p1 = seed_product(&pool, "platform mug", None, Money::from(5_000), 10).await;

        let first = api.process_checkout(request("dup-0001", vec![cart_line(p1, 1)])).await.unwrap();
        let second = api.process_checkout(request("dup-0001", vec![cart_line(p1, 1)])).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.authorization_id, second.authorization_id);
        // stock decremented once, customer charged once
        assert_eq!(api.db().product_by_id(p1).await.unwrap().unwrap().stock, 9);
        assert_eq!(api.processor().authorize_calls().len(), 1);
        tear_down(api).await;
    });
}

#[test]
fn timed_out_authorization_is_reconciled_via_lookup() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let p1 = seed_product(&pool, "platform mug", None, Money::from(5_000), 10).await;
        api.processor().script_authorize(Err(ProcessorError::Timeout(Duration::from_secs(30))));
        api.processor()
            .script_lookup(Ok(Some(AuthorizationHandle { authorization_id: "auth_recovered".to_string() })));

        let order = api.process_checkout(request("to-0001", vec![cart_line(p1, 1)])).await.unwrap();
        assert_eq!(order.authorization_id.as_deref(), Some("auth_recovered"));
        assert_eq!(order.status, OrderStatusType::Pending);
        tear_down(api).await;
    });
}

#[test]
fn timed_out_authorization_that_never_executed_cancels() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let p1 = seed_product(&pool, "platform mug", None, Money::from(5_000), 10).await;
        api.processor().script_authorize(Err(ProcessorError::Timeout(Duration::from_secs(30))));
        // lookup default: Ok(None), the processor never executed the charge

        let err = api.process_checkout(request("to-0002", vec![cart_line(p1, 1)])).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Processor(ProcessorError::Timeout(_))));
        let order_id = OrderId::from("to-0002".to_string());
        let order = api.db().order_by_id(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Cancelled);
        assert_eq!(api.db().product_by_id(p1).await.unwrap().unwrap().stock, 10);
        tear_down(api).await;
    });
}

#[test]
fn resubmission_authorizes_the_stored_total_after_a_price_change() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let p1 = seed_product(&pool, "platform mug", None, Money::from(5_000), 10).await;
        // first attempt times out and the status endpoint is down, so the order stays pending with its
        // reservation and no authorization
        api.processor().script_authorize(Err(ProcessorError::Timeout(Duration::from_secs(30))));
        api.processor().script_lookup(Err(ProcessorError::Api("status endpoint down".to_string())));
        let err = api.process_checkout(request("pr-0001", vec![cart_line(p1, 1)])).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Processor(ProcessorError::Timeout(_))));
        let order_id = OrderId::from("pr-0001".to_string());
        let stored = api.db().order_by_id(&order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatusType::Pending);
        assert!(stored.authorization_id.is_none());

        // the catalog price moves before the client retries
        sqlx::query("UPDATE products SET price = ? WHERE id = ?")
            .bind(Money::from(9_000))
            .bind(p1)
            .execute(&pool)
            .await
            .unwrap();

        let order = api.process_checkout(request("pr-0001", vec![cart_line(p1, 1)])).await.unwrap();
        assert_eq!(order.total_price, Money::from(5_000));
        assert!(order.authorization_id.is_some());
        // the retried authorization charges the snapshotted total, not the new catalog price
        let calls = api.processor().authorize_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].amount, Money::from(5_000));
        assert_eq!(api.db().product_by_id(p1).await.unwrap().unwrap().stock, 9);
        tear_down(api).await;
    });
}

#[test]
fn concurrent_checkouts_never_oversell() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let p1 = seed_product(&pool, "last one", None, Money::from(1_000), 1).await;

        let first = CheckoutApi::new(
            api.db().clone(),
            api.processor().clone(),
            SettlementPlanner::new(CommissionRate::default()),
        );
        let second = CheckoutApi::new(
            api.db().clone(),
            api.processor().clone(),
            SettlementPlanner::new(CommissionRate::default()),
        );
        let a = tokio::spawn(async move { first.process_checkout(request("race-0001", vec![cart_line(p1, 1)])).await });
        let b = tokio::spawn(async move { second.process_checkout(request("race-0002", vec![cart_line(p1, 1)])).await });
        let results = [a.await.unwrap(), b.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one of the two carts gets the last unit");
        assert_eq!(api.db().product_by_id(p1).await.unwrap().unwrap().stock, 0);
        assert_eq!(api.processor().authorize_calls().len(), 1);
        tear_down(api).await;
    });
}

#[test]
fn reserving_a_nonexistent_product_reports_not_found() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let order = NewOrder::new(
            OrderId::from("ghost-0001".to_string()),
            contact(),
            Money::from(1_000),
            SettlementTopology::PlatformOnly,
        );
        let line = NewOrderLine { product_id: 4242, seller_id: None, unit_price: Money::from(1_000), quantity: 1 };
        let err = api.db().create_order_with_reservation(order, vec![line]).await.unwrap_err();
        assert!(matches!(err, PaymentGatewayError::ProductNotFound(4242)));
        tear_down(api).await;
    });
}

#[test]
fn unconnected_seller_blocks_checkout_before_any_side_effects() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let api = setup().await;
        let pool = api.db().pool().clone();
        let s1 = seed_seller(&pool, "Not ready", "acct_x", OnboardingStatus::Pending).await;
        let p1 = seed_product(&pool, "blocked item", Some(s1), Money::from(1_000), 5).await;

        let err = api.process_checkout(request("blk-0001", vec![cart_line(p1, 1)])).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Plan(_)));
        assert_eq!(api.db().product_by_id(p1).await.unwrap().unwrap().stock, 5);
        assert!(api.processor().authorize_calls().is_empty());
        tear_down(api).await;
    });
}
