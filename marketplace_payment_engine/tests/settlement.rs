//! Capture confirmation and seller payout tests. Each test drives a real checkout first so the settlement
//! flow always runs against state the engine itself produced.

use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use marketplace_payment_engine::{
    api::CaptureOutcome,
    db_types::{DeliveryContact, OnboardingStatus, OrderId, OrderStatusType, TransferStatus},
    events::{EventHandlers, EventHooks},
    planner::SettlementPlanner,
    retry::RetryPolicy,
    test_utils::{prepare_test_env, random_db_path, seed_product, seed_seller, StubProcessor},
    traits::ProcessorError,
    CartLine,
    CheckoutApi,
    CheckoutRequest,
    OrderManagement,
    PaymentGatewayDatabase,
    SettlementApi,
    SqliteDatabase,
};
use mpg_common::{CommissionRate, Money};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

async fn setup() -> (SqliteDatabase, StubProcessor) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    (db, StubProcessor::new())
}

async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

fn settlement_api(
    db: &SqliteDatabase,
    processor: &StubProcessor,
    handlers: Option<&EventHandlers>,
) -> SettlementApi<SqliteDatabase, StubProcessor> {
    let producers = handlers.map(EventHandlers::producers).unwrap_or_default();
    // short retry delays keep the exhaustion tests fast
    let retry = RetryPolicy::new(3, Duration::from_millis(1));
    SettlementApi::new(db.clone(), processor.clone(), CommissionRate::default(), retry, producers)
}

/// Run a checkout and return the authorized order.
async fn place_order(
    db: &SqliteDatabase,
    processor: &StubProcessor,
    order_id: &str,
    lines: Vec<CartLine>,
) -> marketplace_payment_engine::db_types::Order {
    let planner = SettlementPlanner::new(CommissionRate::default());
    let api = CheckoutApi::new(db.clone(), processor.clone(), planner);
    let request = CheckoutRequest {
        order_id: OrderId::from(order_id.to_string()),
        customer_id: Some("cust-1".to_string()),
        session_id: None,
        contact: DeliveryContact {
            name: "Alice Example".to_string(),
            email: "alice@example.com".to_string(),
            address: "1 Main St, Springfield".to_string(),
        },
        lines,
    };
    api.process_checkout(request).await.expect("Error processing checkout")
}

#[test]
fn platform_only_capture_pays_the_order_without_transfers() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let p1 = seed_product(db.pool(), "platform mug", None, Money::from(5_000), 10).await;
        let order = place_order(&db, &processor, "cap-0001", vec![CartLine { product_id: p1, quantity: 1 }]).await;
        let auth = order.authorization_id.clone().unwrap();

        let api = settlement_api(&db, &processor, None);
        let outcome = api.process_capture_confirmation(&auth).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Paid { .. }));
        let order = db.order_by_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Paid);
        assert!(db.transfers_for_order(order.id).await.unwrap().is_empty());
        assert!(processor.transfer_calls().is_empty());
        tear_down(db).await;
    });
}

#[test]
fn multi_party_capture_executes_commissioned_transfers() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let s1 = seed_seller(db.pool(), "Seller A", "acct_a", OnboardingStatus::Connected).await;
        let s2 = seed_seller(db.pool(), "Seller B", "acct_b", OnboardingStatus::Connected).await;
        let p1 = seed_product(db.pool(), "item A", Some(s1), Money::from(6_000), 5).await;
        let p2 = seed_product(db.pool(), "item B", Some(s2), Money::from(4_000), 5).await;
        let order = place_order(&db, &processor, "cap-0002", vec![
            CartLine { product_id: p1, quantity: 1 },
            CartLine { product_id: p2, quantity: 1 },
        ])
        .await;
        let auth = order.authorization_id.clone().unwrap();

        let api = settlement_api(&db, &processor, None);
        let outcome = api.process_capture_confirmation(&auth).await.unwrap();
        let CaptureOutcome::Settled { order, transfers } = outcome else {
            panic!("Expected a settled outcome");
        };
        assert_eq!(order.status, OrderStatusType::Paid);
        assert_eq!(transfers.len(), 2);
        // 10% commission on each seller subtotal
        assert_eq!(transfers[0].amount, Money::from(5_400));
        assert_eq!(transfers[1].amount, Money::from(3_600));
        assert!(transfers.iter().all(|t| t.status == TransferStatus::Succeeded));
        assert!(transfers.iter().all(|t| t.processor_transfer_id.is_some()));

        let stored = db.transfers_for_order(order.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|t| t.status == TransferStatus::Succeeded));
        tear_down(db).await;
    });
}

#[test]
fn redelivered_and_unknown_captures_are_no_ops() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let p1 = seed_product(db.pool(), "platform mug", None, Money::from(5_000), 10).await;
        let order = place_order(&db, &processor, "cap-0003", vec![CartLine { product_id: p1, quantity: 1 }]).await;
        let auth = order.authorization_id.clone().unwrap();

        let api = settlement_api(&db, &processor, None);
        let first = api.process_capture_confirmation(&auth).await.unwrap();
        assert!(matches!(first, CaptureOutcome::Paid { .. }));
        let second = api.process_capture_confirmation(&auth).await.unwrap();
        assert!(matches!(second, CaptureOutcome::AlreadyProcessed));
        let unknown = api.process_capture_confirmation("auth_never_issued").await.unwrap();
        assert!(matches!(unknown, CaptureOutcome::AlreadyProcessed));
        tear_down(db).await;
    });
}

#[test]
fn failed_transfer_is_retried_until_it_succeeds() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let s1 = seed_seller(db.pool(), "Seller A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(db.pool(), "item A", Some(s1), Money::from(5_000), 5).await;
        let p2 = seed_product(db.pool(), "platform mug", None, Money::from(1_000), 5).await;
        let order = place_order(&db, &processor, "cap-0004", vec![
            CartLine { product_id: p1, quantity: 1 },
            CartLine { product_id: p2, quantity: 1 },
        ])
        .await;
        processor.script_transfer(Err(ProcessorError::Unavailable("processor maintenance".to_string())));

        let api = settlement_api(&db, &processor, None);
        let outcome = api.process_capture_confirmation(&order.authorization_id.clone().unwrap()).await.unwrap();
        let CaptureOutcome::Settled { transfers, .. } = outcome else {
            panic!("Expected a settled outcome");
        };
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].status, TransferStatus::Succeeded);
        assert_eq!(transfers[0].attempts, 2);
        assert_eq!(processor.transfer_calls().len(), 2);
        tear_down(db).await;
    });
}

#[test]
fn exhausted_transfer_flags_reconciliation_but_not_the_customer() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let s1 = seed_seller(db.pool(), "Seller A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(db.pool(), "item A", Some(s1), Money::from(5_000), 5).await;
        let p2 = seed_product(db.pool(), "platform mug", None, Money::from(1_000), 5).await;
        let order = place_order(&db, &processor, "cap-0005", vec![
            CartLine { product_id: p1, quantity: 1 },
            CartLine { product_id: p2, quantity: 1 },
        ])
        .await;
        processor.script_transfer_failures(3, ProcessorError::Unavailable("processor down".to_string()));

        let api = settlement_api(&db, &processor, None);
        let outcome = api.process_capture_confirmation(&order.authorization_id.clone().unwrap()).await.unwrap();
        let CaptureOutcome::Settled { order, transfers } = outcome else {
            panic!("Expected a settled outcome");
        };
        assert_eq!(transfers[0].status, TransferStatus::FailedExhausted);
        assert_eq!(transfers[0].attempts, 3);
        assert!(transfers[0].last_error.is_some());

        // the customer-facing order stays paid; the failure is an operator problem
        let order = db.order_by_pk(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Paid);
        assert!(order.needs_reconciliation);
        let unresolved = db.unresolved_transfers().await.unwrap();
        assert_eq!(unresolved.len(), 1);
        tear_down(db).await;
    });
}

#[test]
fn settlement_events_reach_subscribers() {
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    let paid = Arc::new(AtomicI32::new(0));
    let failed = Arc::new(AtomicI32::new(0));
    let paid_count = paid.clone();
    let failed_count = failed.clone();
    rt.block_on(async move {
        let (db, processor) = setup().await;
        let s1 = seed_seller(db.pool(), "Seller A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(db.pool(), "item A", Some(s1), Money::from(5_000), 5).await;
        let p2 = seed_product(db.pool(), "platform mug", None, Money::from(1_000), 5).await;
        let order = place_order(&db, &processor, "cap-0006", vec![
            CartLine { product_id: p1, quantity: 1 },
            CartLine { product_id: p2, quantity: 1 },
        ])
        .await;
        processor.script_transfer_failures(3, ProcessorError::Unavailable("processor down".to_string()));

        let mut hooks = EventHooks::default();
        hooks.on_order_paid(move |ev| {
            info!("🪝️ Order {} paid", ev.order.order_id);
            paid.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        });
        hooks.on_transfer_failed(move |ev| {
            info!("🪝️ Transfer #{} failed", ev.transfer.id);
            failed.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        });
        let handlers = EventHandlers::new(10, hooks);
        let api = settlement_api(&db, &processor, Some(&handlers));
        handlers.start_handlers().await;

        let _ = api.process_capture_confirmation(&order.authorization_id.clone().unwrap()).await.unwrap();
        // handler tasks run on the event loop; give them a beat to drain
        tokio::time::sleep(Duration::from_millis(100)).await;
        tear_down(db).await;
    });
    assert_eq!(paid_count.load(Ordering::SeqCst), 1);
    assert_eq!(failed_count.load(Ordering::SeqCst), 1);
}
