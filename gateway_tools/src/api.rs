use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::GatewayConfig,
    data_objects::{GatewayOrder, GatewayPayment, GatewayRefund, NewGatewayOrder, NewRefund},
    GatewayApiError,
};

const API_VERSION: &str = "v1";

#[derive(Clone)]
pub struct GatewayApi {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl GatewayApi {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn key_id(&self) -> &str {
        self.config.key_id.as_str()
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, GatewayApiError> {
        let url = self.url(path);
        trace!("💳️ Sending REST query: {method} {url}");
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(self.config.key_id.as_str(), Some(self.config.key_secret.reveal()));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(GatewayApiError::from_transport)?;
        if response.status().is_success() {
            trace!("💳️ REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| GatewayApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(GatewayApiError::from_transport)?;
            Err(GatewayApiError::from_response(status, &message))
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{API_VERSION}{path}", self.config.base_url.trim_end_matches('/'))
    }

    pub async fn create_order(&self, order: &NewGatewayOrder) -> Result<GatewayOrder, GatewayApiError> {
        debug!("💳️ Creating gateway order for receipt {} ({} {})", order.receipt, order.amount, order.currency);
        let result = self.rest_query::<GatewayOrder, _>(Method::POST, "/orders", Some(order)).await?;
        info!("💳️ Gateway order {} created for receipt {}", result.id, order.receipt);
        Ok(result)
    }

    pub async fn fetch_order(&self, gateway_order_id: &str) -> Result<GatewayOrder, GatewayApiError> {
        check_identifier(gateway_order_id)?;
        let path = format!("/orders/{gateway_order_id}");
        self.rest_query::<GatewayOrder, ()>(Method::GET, &path, None).await
    }

    pub async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayApiError> {
        check_identifier(payment_id)?;
        let path = format!("/payments/{payment_id}");
        self.rest_query::<GatewayPayment, ()>(Method::GET, &path, None).await
    }

    pub async fn create_refund(&self, payment_id: &str, refund: &NewRefund) -> Result<GatewayRefund, GatewayApiError> {
        check_identifier(payment_id)?;
        let path = format!("/payments/{payment_id}/refund");
        debug!("💳️ Requesting refund of {} for payment {payment_id}", refund.amount);
        let result = self.rest_query::<GatewayRefund, _>(Method::POST, &path, Some(refund)).await?;
        info!("💳️ Refund {} issued for payment {payment_id}", result.id);
        Ok(result)
    }
}

/// Gateway ids are interpolated into URL paths, so only accept the characters the gateway actually uses.
fn check_identifier(id: &str) -> Result<(), GatewayApiError> {
    if !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(GatewayApiError::InvalidIdentifier(id.to_string()))
    }
}
