//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate
//! module. Keep this module neat and tidy 🙏
//!
//! Handlers are generic over the database backend and payment processor; [`crate::server`] registers them
//! against the concrete types it wires up.

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use marketplace_payment_engine::{
    db_types::OrderId,
    CartLine,
    CheckoutApi,
    CheckoutRequest,
    OrderManagement,
    PaymentGatewayDatabase,
    PaymentProcessor,
    RefundApi,
    RefundRequest,
    SettlementApi,
};

use crate::{
    auth::CallerIdentity,
    config::{ServerConfig, WEBHOOK_SIGNATURE_HEADER},
    data_objects::{
        CancelRefundPayload,
        CaptureNotification,
        CheckoutPayload,
        JsonResponse,
        OrderResult,
        ProcessRefundPayload,
        RefundPayload,
    },
    errors::{AuthError, ServerError},
    helpers::calculate_hmac,
};

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  --------------------------------------------------
pub async fn checkout<B, P>(
    api: web::Data<CheckoutApi<B, P>>,
    body: web::Json<CheckoutPayload>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + 'static,
    P: PaymentProcessor + 'static,
{
    let payload = body.into_inner();
    debug!("💻️ POST checkout for order {}", payload.order_id);
    let request = CheckoutRequest {
        order_id: payload.order_id,
        customer_id: payload.customer_id,
        session_id: payload.session_id,
        contact: payload.contact,
        lines: payload
            .lines
            .into_iter()
            .map(|l| CartLine { product_id: l.product_id, quantity: l.quantity })
            .collect(),
    };
    let order = api.process_checkout(request).await?;
    Ok(HttpResponse::Ok().json(order))
}

//---------------------------------------   Capture webhook  --------------------------------------------------
/// The processor's capture confirmation. The body signature is verified against the shared webhook secret
/// before anything is parsed; an unverifiable delivery is rejected outright.
pub async fn capture_webhook<B, P>(
    req: HttpRequest,
    api: web::Data<SettlementApi<B, P>>,
    config: web::Data<ServerConfig>,
    body: web::Bytes,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + 'static,
    P: PaymentProcessor + 'static,
{
    if config.webhook_signature_checks {
        let signature = req
            .headers()
            .get(WEBHOOK_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ServerError::AuthenticationError(AuthError::MissingSignature))?;
        let expected = calculate_hmac(config.webhook_secret.reveal(), body.as_ref());
        if signature != expected {
            warn!("🔐️ Invalid signature on capture confirmation. Denying.");
            return Err(ServerError::AuthenticationError(AuthError::InvalidSignature));
        }
        trace!("🔐️ Capture confirmation signature ✅️");
    }
    let notification: CaptureNotification =
        serde_json::from_slice(body.as_ref()).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    debug!("💻️ Capture confirmation for [{}]", notification.authorization_id);
    let outcome = api.process_capture_confirmation(&notification.authorization_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{outcome:?}"))))
}

//----------------------------------------------   Refunds  ----------------------------------------------------
pub async fn request_refund<B, P>(
    path: web::Path<String>,
    api: web::Data<RefundApi<B, P>>,
    body: web::Json<RefundPayload>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + 'static,
    P: PaymentProcessor + 'static,
{
    let order_id = OrderId::from(path.into_inner());
    let payload = body.into_inner();
    debug!("💻️ POST refund request against order {order_id}");
    let request = RefundRequest {
        order_id,
        line_ids: payload.line_ids,
        amount: payload.amount,
        reason: payload.reason,
        requested_by: payload.requested_by,
    };
    let refund = api.request_refund(request).await?;
    Ok(HttpResponse::Ok().json(refund))
}

pub async fn process_refund<B, P>(
    path: web::Path<i64>,
    identity: CallerIdentity,
    api: web::Data<RefundApi<B, P>>,
    body: web::Json<ProcessRefundPayload>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + 'static,
    P: PaymentProcessor + 'static,
{
    let refund_id = path.into_inner();
    debug!("💻️ POST process refund #{refund_id} by {}", identity.principal());
    let refund = api.process_refund(refund_id, identity.principal(), body.notes.as_deref()).await?;
    Ok(HttpResponse::Ok().json(refund))
}

pub async fn cancel_refund<B, P>(
    path: web::Path<i64>,
    identity: CallerIdentity,
    api: web::Data<RefundApi<B, P>>,
    body: web::Json<CancelRefundPayload>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + 'static,
    P: PaymentProcessor + 'static,
{
    let refund_id = path.into_inner();
    debug!("💻️ POST cancel refund #{refund_id} by {}", identity.principal());
    let refund = api.cancel_refund(refund_id, identity.principal(), &body.reason).await?;
    Ok(HttpResponse::Ok().json(refund))
}

pub async fn my_refunds<B, P>(
    identity: CallerIdentity,
    api: web::Data<RefundApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + 'static,
    P: PaymentProcessor + 'static,
{
    debug!("💻️ GET refunds for {}", identity.principal());
    let refunds = api.refunds_visible_to(identity.principal()).await?;
    Ok(HttpResponse::Ok().json(refunds))
}

//----------------------------------------------   Orders  ----------------------------------------------------
pub async fn order_by_id<B: OrderManagement + 'static>(
    path: web::Path<String>,
    db: web::Data<B>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ GET order {order_id}");
    let order =
        db.order_by_id(&order_id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id}")))?;
    let transfers = db.transfers_for_order(order.id).await?;
    let refunds = db.refunds_for_order(order.id).await?;
    Ok(HttpResponse::Ok().json(OrderResult { order, transfers, refunds }))
}

pub async fn order_transfers<B: OrderManagement + 'static>(
    path: web::Path<String>,
    db: web::Data<B>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ GET transfers for order {order_id}");
    let order =
        db.order_by_id(&order_id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id}")))?;
    let transfers = db.transfers_for_order(order.id).await?;
    Ok(HttpResponse::Ok().json(transfers))
}
