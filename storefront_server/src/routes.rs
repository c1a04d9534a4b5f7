//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST hand their work to the settlement engine. Keep this module neat and
//! tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every handler here awaits the settlement engine (database and
//! gateway I/O), so none of them block.
//!
//! A note about cancellation:
//! actix drops a handler's future when the client hangs up. That is fine for most routes, since each engine call is a
//! single conditional write, but webhook processing must always run to completion. So the webhook handler runs the work
//! on its own task and merely waits for it.
use actix_web::{
    get,
    web::{self, ServiceConfig},
    HttpRequest,
    HttpResponse,
    Responder,
};
use log::*;
use settlement_engine::{traits::PaymentGateway, SettlementApi, SettlementDatabase};

use crate::{
    auth::{JwtClaims, Role},
    config::ServerOptions,
    data_objects::{
        CheckoutResponse,
        CreateOrderParams,
        RefundParams,
        RefundResponse,
        VerifyPaymentParams,
        VerifyPaymentResponse,
        WebhookAck,
    },
    errors::ServerError,
    helpers::get_remote_ip,
};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";
pub const EVENT_ID_HEADER: &str = "x-gateway-event-id";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

/// Registers every route, plus the extractor configuration that turns malformed bodies into JSON errors. Used by the
/// server and by the endpoint tests, so that both see the same app.
pub fn configure_routes<B, G>(cfg: &mut ServiceConfig)
where
    B: SettlementDatabase + 'static,
    G: PaymentGateway + 'static,
{
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default().error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
    )
    .service(health)
    .service(CreateGatewayOrderRoute::<B, G>::new())
    .service(VerifyPaymentRoute::<B, G>::new())
    .service(GatewayWebhookRoute::<B, G>::new())
    .service(RefundOrderRoute::<B, G>::new())
    .service(OrderPaymentRoute::<B, G>::new());
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(create_gateway_order => Post "/payments/gateway/create-order" impl SettlementDatabase, PaymentGateway);
/// Route handler for the create-order endpoint
///
/// Opens a gateway order for one of the caller's own orders, so that the checkout page can show the gateway's payment
/// form. The amount is always taken from the stored order; the request only names the order.
pub async fn create_gateway_order<B, G>(
    claims: JwtClaims,
    body: web::Json<CreateOrderParams>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let order_id = body.order_id;
    debug!("💻️ POST create-order for order {order_id} from {}", claims.sub);
    let checkout = api.create_gateway_order(order_id, &claims.principal()).await.map_err(|e| {
        debug!("💻️ Could not create a gateway order for order {order_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(CheckoutResponse::from(checkout)))
}

route!(verify_payment => Post "/payments/gateway/verify" impl SettlementDatabase, PaymentGateway);
/// Route handler for the payment verification endpoint
///
/// The customer's browser calls this after the gateway's payment form reports success. A valid claim moves the order to
/// `VERIFICATION_PENDING`; only the gateway's webhook can mark it as paid.
pub async fn verify_payment<B, G>(
    claims: JwtClaims,
    body: web::Json<VerifyPaymentParams>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let params = body.into_inner();
    let order_id = params.order_id;
    debug!("💻️ POST verify for order {order_id} from {}", claims.sub);
    let result = api.confirm_payment(&claims.principal(), params.into()).await.map_err(|e| {
        debug!("💻️ Payment confirmation for order {order_id} was refused. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(VerifyPaymentResponse::from(result)))
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(gateway_webhook => Post "/payments/gateway/webhook" impl SettlementDatabase, PaymentGateway);
/// Route handler for the gateway's webhook
///
/// No bearer token here. The gateway signs the raw body with the webhook secret and the signature arrives in the
/// `x-gateway-signature` header. The body is handed to the engine byte for byte; re-serializing it would break the
/// signature.
///
/// Responds with 200 once the event is on the ledger, even if applying it failed. The failure is stored on the ledger
/// entry and the gateway's redelivery will try again.
pub async fn gateway_webhook<B, G>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let options = req.app_data::<web::Data<ServerOptions>>().map(|o| *o.get_ref()).unwrap_or_default();
    let remote_ip = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded);
    let signature = header_value(&req, SIGNATURE_HEADER).unwrap_or_default();
    let event_id = header_value(&req, EVENT_ID_HEADER);
    info!(
        "💻️ Webhook delivery from {} ({} bytes, event id header: {})",
        remote_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown peer".into()),
        body.len(),
        event_id.as_deref().unwrap_or("none")
    );
    let api = api.into_inner();
    let task =
        actix_web::rt::spawn(async move { api.process_webhook(&body, &signature, event_id.as_deref()).await });
    let receipt = task.await.map_err(|e| {
        error!("💻️ Webhook processing task did not complete. {e}");
        ServerError::Unspecified(format!("Webhook processing was interrupted. {e}"))
    })??;
    debug!("💻️ Webhook event {} ({}) acknowledged. {:?}", receipt.event_id, receipt.event_type, receipt.outcome);
    Ok(HttpResponse::Ok().json(WebhookAck::from(receipt)))
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(refund_order => Post "/orders/{order_id}/refund" impl SettlementDatabase, PaymentGateway where requires [Role::Admin]);
/// Route handler for the refund endpoint. Admins only.
///
/// Body is `{ "amount": <minor units>, "reason": "..." }`, both optional. Without an amount, everything not yet
/// refunded is refunded. The order's payment status only changes when the gateway's refund webhook arrives.
pub async fn refund_order<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<RefundParams>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    let params = body.into_inner();
    info!("💻️ POST refund for order {order_id} by {} ({:?})", claims.sub, params.amount);
    let ticket = api.request_refund(order_id, params.into()).await.map_err(|e| {
        warn!("💻️ Refund for order {order_id} was not issued. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(RefundResponse::from(ticket)))
}

route!(order_payment => Get "/orders/{order_id}/payment" impl SettlementDatabase, PaymentGateway);
/// Route handler for the payment summary of an order. Customers can see their own orders; admins can see any order.
pub async fn order_payment<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    debug!("💻️ GET payment for order {order_id} by {}", claims.sub);
    let summary = api.fetch_payment_summary(order_id, &claims.principal()).await?;
    Ok(HttpResponse::Ok().json(summary))
}
