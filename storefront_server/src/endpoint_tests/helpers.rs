use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use chrono::{Duration, Utc};
use log::debug;
use settlement_engine::{
    db_types::{MinorUnits, NewOrder, Order},
    events::EventProducers,
    settlement_objects::SettlementOptions,
    test_utils::{mock_gateway::MockGateway, prepare_env::test_db},
    SettlementApi,
    SettlementDatabase,
    SqliteDatabase,
};
use storefront_common::Secret;

use crate::{
    auth::{JwtAuthority, JwtClaims, Role},
    routes::configure_routes,
};

// Test-only secrets. DO NOT re-use these anywhere.
pub const JWT_SECRET: &str = "endpoint-test-jwt-secret";
pub const PAYMENT_SECRET: &str = "endpoint-test-key-secret";
pub const WEBHOOK_SECRET: &str = "endpoint-test-webhook-secret";

pub type TestApi = SettlementApi<SqliteDatabase, MockGateway>;

/// A settlement API over a fresh database and the mock gateway. Events go nowhere.
pub struct TestServer {
    pub api: web::Data<TestApi>,
    pub gateway: MockGateway,
}

impl TestServer {
    pub async fn new() -> Self {
        let db = test_db().await;
        let gateway = MockGateway::new();
        let options = SettlementOptions::new(
            Secret::from(PAYMENT_SECRET),
            Secret::from(WEBHOOK_SECRET),
            MinorUnits::from(1_000_000),
        );
        let api = web::Data::new(SettlementApi::new(db, gateway.clone(), options, EventProducers::default()));
        Self { api, gateway }
    }

    pub fn db(&self) -> &SqliteDatabase {
        self.api.db()
    }

    pub async fn new_order(&self, number: &str, customer_id: &str, amount: i64) -> Order {
        let order = NewOrder::new(number, customer_id, MinorUnits::from(amount), "INR");
        self.api.insert_order(order).await.expect("Could not insert order")
    }

    pub async fn reload(&self, order_id: i64) -> Order {
        self.db().fetch_order_by_id(order_id).await.unwrap().expect("Order has gone missing")
    }

    /// Builds the full app, sends the request and returns the status and body.
    pub async fn send(&self, req: TestRequest) -> (StatusCode, String) {
        let app = App::new()
            .app_data(self.api.clone())
            .app_data(web::Data::new(JwtAuthority::new(Secret::from(JWT_SECRET))))
            .configure(configure_routes::<SqliteDatabase, MockGateway>);
        let service = test::init_service(app).await;
        debug!("Making request");
        // Middleware (e.g. the ACL) rejects with an error rather than a response
        let (status, body) = match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => (res.status(), res.into_body().try_into_bytes().unwrap()),
            Err(e) => {
                let res = e.error_response();
                (res.status(), res.into_body().try_into_bytes().unwrap())
            },
        };
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn send_json(&self, req: TestRequest) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.send(req).await;
        let json = serde_json::from_str(&body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"));
        (status, json)
    }
}

pub fn issue_token(customer_id: &str, roles: &[Role]) -> String {
    let claims = JwtClaims::new(customer_id, roles);
    JwtAuthority::new(Secret::from(JWT_SECRET)).issue_token(&claims, Utc::now() + Duration::hours(1)).unwrap()
}

pub fn bearer(customer_id: &str, roles: &[Role]) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", issue_token(customer_id, roles)))
}

pub fn post_json(path: &str, body: serde_json::Value) -> TestRequest {
    TestRequest::post().uri(path).set_json(body)
}
