//! Refund lifecycle tests: ownership routing, the approval gate, processor reversal and cancellation.

use log::*;
use marketplace_payment_engine::{
    db_types::{
        DeliveryContact,
        OnboardingStatus,
        Order,
        OrderId,
        OrderStatusType,
        OwningParty,
        Principal,
        RefundKind,
        RefundStatus,
    },
    planner::SettlementPlanner,
    retry::RetryPolicy,
    test_utils::{prepare_test_env, random_db_path, seed_product, seed_seller, StubProcessor},
    traits::ProcessorError,
    CartLine,
    CheckoutApi,
    CheckoutRequest,
    OrderManagement,
    PaymentGatewayDatabase,
    RefundApi,
    RefundApiError,
    RefundRequest,
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

fn refund_api(db: &SqliteDatabase, processor: &StubProcessor) -> RefundApi<SqliteDatabase, StubProcessor> {
    RefundApi::new(db.clone(), processor.clone(), Default::default())
}

/// Checkout and capture in one step, returning the paid order.
async fn paid_order(db: &SqliteDatabase, processor: &StubProcessor, order_id: &str, lines: Vec<CartLine>) -> Order {
    let planner = SettlementPlanner::new(CommissionRate::default());
    let checkout = CheckoutApi::new(db.clone(), processor.clone(), planner);
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
    let order = checkout.process_checkout(request).await.expect("Error processing checkout");
    let settlement = SettlementApi::new(
        db.clone(),
        processor.clone(),
        CommissionRate::default(),
        RetryPolicy::new(3, std::time::Duration::from_millis(1)),
        Default::default(),
    );
    settlement
        .process_capture_confirmation(order.authorization_id.as_deref().unwrap())
        .await
        .expect("Error confirming capture");
    db.order_by_id(&order.order_id).await.unwrap().unwrap()
}

fn refund_request(order_id: &OrderId, line_ids: Vec<i64>, amount: Option<Money>) -> RefundRequest {
    RefundRequest {
        order_id: order_id.clone(),
        line_ids,
        amount,
        reason: "arrived damaged".to_string(),
        requested_by: "cust-1".to_string(),
    }
}

#[test]
fn full_refund_of_a_platform_order_is_platform_owned() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let p1 = seed_product(db.pool(), "platform mug", None, Money::from(5_000), 10).await;
        let order = paid_order(&db, &processor, "rf-0001", vec![CartLine { product_id: p1, quantity: 2 }]).await;

        let api = refund_api(&db, &processor);
        let refund = api.request_refund(refund_request(&order.order_id, vec![], None)).await.unwrap();
        assert_eq!(refund.status, RefundStatus::Pending);
        assert_eq!(refund.kind, RefundKind::Full);
        assert_eq!(refund.amount, Money::from(10_000));
        assert_eq!(refund.owning_party().unwrap(), OwningParty::Platform);

        let order = db.order_by_pk(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::RefundRequested);
        tear_down(db).await;
    });
}

#[test]
fn seller_line_refund_is_seller_owned_and_partial() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let s1 = seed_seller(db.pool(), "Seller A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(db.pool(), "item A", Some(s1), Money::from(4_000), 5).await;
        let p2 = seed_product(db.pool(), "platform mug", None, Money::from(1_000), 5).await;
        let order = paid_order(&db, &processor, "rf-0002", vec![
            CartLine { product_id: p1, quantity: 1 },
            CartLine { product_id: p2, quantity: 1 },
        ])
        .await;
        let lines = db.lines_for_order(order.id).await.unwrap();
        let seller_line = lines.iter().find(|l| l.seller_id == Some(s1)).unwrap();

        let api = refund_api(&db, &processor);
        let refund = api.request_refund(refund_request(&order.order_id, vec![seller_line.id], None)).await.unwrap();
        assert_eq!(refund.kind, RefundKind::Partial);
        assert_eq!(refund.amount, Money::from(4_000));
        assert_eq!(refund.owning_party().unwrap(), OwningParty::Seller(s1));
        tear_down(db).await;
    });
}

#[test]
fn refunds_spanning_owners_are_rejected() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let s1 = seed_seller(db.pool(), "Seller A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(db.pool(), "item A", Some(s1), Money::from(4_000), 5).await;
        let p2 = seed_product(db.pool(), "platform mug", None, Money::from(1_000), 5).await;
        let order = paid_order(&db, &processor, "rf-0003", vec![
            CartLine { product_id: p1, quantity: 1 },
            CartLine { product_id: p2, quantity: 1 },
        ])
        .await;

        let api = refund_api(&db, &processor);
        // covering all lines spans the platform and seller A
        let err = api.request_refund(refund_request(&order.order_id, vec![], None)).await.unwrap_err();
        assert!(matches!(err, RefundApiError::MixedOwnership));
        tear_down(db).await;
    });
}

#[test]
fn refund_amounts_cannot_exceed_the_refundable_balance() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let p1 = seed_product(db.pool(), "platform mug", None, Money::from(5_000), 10).await;
        let order = paid_order(&db, &processor, "rf-0004", vec![CartLine { product_id: p1, quantity: 1 }]).await;

        let api = refund_api(&db, &processor);
        let err = api
            .request_refund(refund_request(&order.order_id, vec![], Some(Money::from(6_000))))
            .await
            .unwrap_err();
        assert!(matches!(err, RefundApiError::ExceedsRefundable { .. }));

        // a completed partial refund shrinks the refundable balance
        let refund = api.request_refund(refund_request(&order.order_id, vec![], Some(Money::from(3_000)))).await.unwrap();
        api.process_refund(refund.id, &Principal::PlatformAdmin, None).await.unwrap();
        let err = api
            .request_refund(refund_request(&order.order_id, vec![], Some(Money::from(2_500))))
            .await
            .unwrap_err();
        assert!(matches!(err, RefundApiError::ExceedsRefundable { .. }));
        tear_down(db).await;
    });
}

#[test]
fn owner_approval_reverses_the_charge_and_completes() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let p1 = seed_product(db.pool(), "platform mug", None, Money::from(5_000), 10).await;
        let order = paid_order(&db, &processor, "rf-0005", vec![CartLine { product_id: p1, quantity: 1 }]).await;

        let api = refund_api(&db, &processor);
        let refund = api.request_refund(refund_request(&order.order_id, vec![], None)).await.unwrap();
        let refund = api.process_refund(refund.id, &Principal::PlatformAdmin, Some("approved")).await.unwrap();
        assert_eq!(refund.status, RefundStatus::Completed);
        assert!(refund.reversal_id.is_some());
        assert_eq!(refund.processed_by.as_deref(), Some("platform-admin"));

        let reversals = processor.reversal_calls();
        assert_eq!(reversals.len(), 1);
        assert_eq!(reversals[0].amount, Money::from(5_000));
        assert_eq!(Some(reversals[0].authorization_id.clone()), order.authorization_id);

        // refunds now cover the full total, so the order itself is refunded
        let order = db.order_by_pk(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Refunded);
        tear_down(db).await;
    });
}

#[test]
fn only_the_owning_party_may_act_on_a_refund() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let s1 = seed_seller(db.pool(), "Seller A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(db.pool(), "item A", Some(s1), Money::from(4_000), 5).await;
        let order = paid_order(&db, &processor, "rf-0006", vec![CartLine { product_id: p1, quantity: 1 }]).await;

        let api = refund_api(&db, &processor);
        let refund = api.request_refund(refund_request(&order.order_id, vec![], None)).await.unwrap();
        assert_eq!(refund.owning_party().unwrap(), OwningParty::Seller(s1));

        // neither the platform admin nor another seller may approve or cancel it
        let err = api.process_refund(refund.id, &Principal::PlatformAdmin, None).await.unwrap_err();
        assert!(matches!(err, RefundApiError::NotRefundOwner));
        let err = api.cancel_refund(refund.id, &Principal::Seller(s1 + 1), "not mine").await.unwrap_err();
        assert!(matches!(err, RefundApiError::NotRefundOwner));
        assert!(processor.reversal_calls().is_empty());

        let refund = api.process_refund(refund.id, &Principal::Seller(s1), None).await.unwrap();
        assert_eq!(refund.status, RefundStatus::Completed);
        tear_down(db).await;
    });
}

#[test]
fn failed_reversal_parks_the_refund_for_a_human() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let p1 = seed_product(db.pool(), "platform mug", None, Money::from(5_000), 10).await;
        let order = paid_order(&db, &processor, "rf-0007", vec![CartLine { product_id: p1, quantity: 1 }]).await;
        processor.script_reversal(Err(ProcessorError::Api("reversal rejected".to_string())));

        let api = refund_api(&db, &processor);
        let refund = api.request_refund(refund_request(&order.order_id, vec![], None)).await.unwrap();
        let err = api.process_refund(refund.id, &Principal::PlatformAdmin, None).await.unwrap_err();
        assert!(matches!(err, RefundApiError::Processor(_)));

        // failed, not retried, error retained; the order total is untouched
        let refund = db.refund_by_id(refund.id).await.unwrap().unwrap();
        assert_eq!(refund.status, RefundStatus::Failed);
        assert!(refund.last_error.is_some());
        let order = db.order_by_pk(order.id).await.unwrap().unwrap();
        assert_ne!(order.status, OrderStatusType::Refunded);
        tear_down(db).await;
    });
}

#[test]
fn cancelling_the_last_open_refund_returns_the_order_to_paid() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let p1 = seed_product(db.pool(), "platform mug", None, Money::from(5_000), 10).await;
        let order = paid_order(&db, &processor, "rf-0008", vec![CartLine { product_id: p1, quantity: 1 }]).await;

        let api = refund_api(&db, &processor);
        let refund = api.request_refund(refund_request(&order.order_id, vec![], None)).await.unwrap();
        assert!(matches!(
            api.cancel_refund(refund.id, &Principal::PlatformAdmin, " ").await.unwrap_err(),
            RefundApiError::ReasonRequired
        ));
        let refund = api.cancel_refund(refund.id, &Principal::PlatformAdmin, "customer withdrew").await.unwrap();
        assert_eq!(refund.status, RefundStatus::Cancelled);

        let order = db.order_by_pk(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Paid);
        // a cancelled refund is terminal
        let err = api.process_refund(refund.id, &Principal::PlatformAdmin, None).await.unwrap_err();
        assert!(matches!(err, RefundApiError::InvalidState(_)));
        tear_down(db).await;
    });
}

#[test]
fn refund_visibility_is_scoped_to_the_owning_party() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (db, processor) = setup().await;
        let s1 = seed_seller(db.pool(), "Seller A", "acct_a", OnboardingStatus::Connected).await;
        let p1 = seed_product(db.pool(), "item A", Some(s1), Money::from(4_000), 5).await;
        let p2 = seed_product(db.pool(), "platform mug", None, Money::from(5_000), 10).await;
        let seller_order = paid_order(&db, &processor, "rf-0009a", vec![CartLine { product_id: p1, quantity: 1 }]).await;
        let platform_order = paid_order(&db, &processor, "rf-0009b", vec![CartLine { product_id: p2, quantity: 1 }]).await;

        let api = refund_api(&db, &processor);
        api.request_refund(refund_request(&seller_order.order_id, vec![], None)).await.unwrap();
        api.request_refund(refund_request(&platform_order.order_id, vec![], None)).await.unwrap();

        let seller_view = api.refunds_visible_to(&Principal::Seller(s1)).await.unwrap();
        assert_eq!(seller_view.len(), 1);
        assert_eq!(seller_view[0].owning_party().unwrap(), OwningParty::Seller(s1));
        let admin_view = api.refunds_visible_to(&Principal::PlatformAdmin).await.unwrap();
        assert_eq!(admin_view.len(), 1);
        assert_eq!(admin_view[0].owning_party().unwrap(), OwningParty::Platform);
        assert!(api.refunds_visible_to(&Principal::Seller(s1 + 1)).await.unwrap().is_empty());
        tear_down(db).await;
    });
}
