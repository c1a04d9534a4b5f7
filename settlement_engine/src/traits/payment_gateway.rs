use gateway_tools::{
    GatewayApi,
    GatewayApiError,
    GatewayOrder,
    GatewayPayment,
    GatewayRefund,
    NewGatewayOrder,
    NewRefund,
};

/// Outbound calls to the payment gateway. All amounts are in minor currency units.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// The public key id that checkout pages need in order to open the gateway's payment form.
    fn key_id(&self) -> &str;

    async fn create_order(&self, order: &NewGatewayOrder) -> Result<GatewayOrder, GatewayApiError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayApiError>;

    async fn fetch_order(&self, gateway_order_id: &str) -> Result<GatewayOrder, GatewayApiError>;

    async fn create_refund(&self, payment_id: &str, refund: &NewRefund) -> Result<GatewayRefund, GatewayApiError>;
}

impl PaymentGateway for GatewayApi {
    fn key_id(&self) -> &str {
        GatewayApi::key_id(self)
    }

    async fn create_order(&self, order: &NewGatewayOrder) -> Result<GatewayOrder, GatewayApiError> {
        GatewayApi::create_order(self, order).await
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayApiError> {
        GatewayApi::fetch_payment(self, payment_id).await
    }

    async fn fetch_order(&self, gateway_order_id: &str) -> Result<GatewayOrder, GatewayApiError> {
        GatewayApi::fetch_order(self, gateway_order_id).await
    }

    async fn create_refund(&self, payment_id: &str, refund: &NewRefund) -> Result<GatewayRefund, GatewayApiError> {
        GatewayApi::create_refund(self, payment_id, refund).await
    }
}
