use std::time::Duration;

use actix_web::{
    dev::Server,
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use log::*;
use marketplace_payment_engine::{
    events::{EventHandlers, EventHooks},
    planner::SettlementPlanner,
    retry::RetryPolicy,
    CheckoutApi,
    PaymentProcessor,
    RefundApi,
    SettlementApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    processor::SandboxProcessor,
    routes::{
        cancel_refund,
        capture_webhook,
        checkout,
        health,
        my_refunds,
        order_by_id,
        order_transfers,
        process_refund,
        request_refund,
    },
};

const EVENT_BUFFER_SIZE: usize = 50;

/// Run the server against a SQLite backend and the sandbox processor.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let processor = SandboxProcessor::new();
    let srv = create_server_instance(config, db, processor, default_hooks())?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// The default event subscribers: the notifier integration point. Until a real notifier is connected, each
/// event is logged so operators can tail the lifecycle in the server logs.
pub fn default_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        info!("📧️ Order {} paid. {} would be notified.", ev.order.order_id, ev.order.contact_email);
        Box::pin(async {})
    });
    hooks.on_transfer_failed(|ev| {
        warn!(
            "📧️ Payout of {} to seller {} failed permanently (order {}). Operators would be alerted.",
            ev.transfer.amount, ev.transfer.seller_id, ev.order.order_id
        );
        Box::pin(async {})
    });
    hooks.on_refund_settled(|ev| {
        info!("📧️ Refund #{} is now {:?}.", ev.refund.id, ev.outcome);
        Box::pin(async {})
    });
    hooks
}

pub fn create_server_instance<P>(
    config: ServerConfig,
    db: SqliteDatabase,
    processor: P,
    hooks: EventHooks,
) -> Result<Server, ServerError>
where
    P: PaymentProcessor + 'static,
{
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    tokio::spawn(async move {
        handlers.start_handlers().await;
    });
    let bind_address = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let planner = SettlementPlanner::new(config.commission);
        let retry = RetryPolicy::new(config.max_transfer_attempts, config.transfer_retry_delay);
        let checkout_api = CheckoutApi::new(db.clone(), processor.clone(), planner);
        let settlement_api =
            SettlementApi::new(db.clone(), processor.clone(), config.commission, retry, producers.clone());
        let refund_api = RefundApi::new(db.clone(), processor.clone(), producers.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mpg::access_log"))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(refund_api))
            .service(health)
            .route("/checkout", web::post().to(checkout::<SqliteDatabase, P>))
            .route("/webhook/capture", web::post().to(capture_webhook::<SqliteDatabase, P>))
            .route("/orders/{id}/refunds", web::post().to(request_refund::<SqliteDatabase, P>))
            .route("/orders/{id}/transfers", web::get().to(order_transfers::<SqliteDatabase>))
            .route("/orders/{id}", web::get().to(order_by_id::<SqliteDatabase>))
            .route("/refunds/{id}/process", web::post().to(process_refund::<SqliteDatabase, P>))
            .route("/refunds/{id}/cancel", web::post().to(cancel_refund::<SqliteDatabase, P>))
            .route("/refunds", web::get().to(my_refunds::<SqliteDatabase, P>))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(bind_address)?
    .run();
    Ok(srv)
}
