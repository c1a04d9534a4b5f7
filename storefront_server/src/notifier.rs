//! Outbound email.
//!
//! The server does not speak SMTP. Messages are posted as JSON to a mail relay (`SF_MAIL_RELAY_URL`), which knows how
//! to turn a customer id into an address. Without a relay, messages are only logged.
//!
//! Every `notify_*` method is best-effort: delivery errors are logged and swallowed. The methods are called from event
//! handlers, off the settlement path, so a slow relay never holds up a payment.
use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use log::*;
use serde::Serialize;
use settlement_engine::db_types::{MinorUnits, Order};
use thiserror::Error;

use crate::config::NotifierConfig;

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("Could not reach the mail relay. {0}")]
    RelayUnavailable(String),
    #[error("The mail relay refused the message. {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Customer(String),
    Operator(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: Recipient,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn new(to: Recipient, subject: &str, body: String) -> Self {
        Self { to, subject: subject.to_string(), body }
    }
}

/// Whatever actually moves the message.
pub trait MailTransport: Send + Sync + 'static {
    fn send(&self, message: MailMessage) -> BoxFuture<'static, Result<(), NotifierError>>;
}

/// Posts messages as JSON to the mail relay.
#[derive(Clone)]
pub struct RelayTransport {
    client: reqwest::Client,
    url: String,
}

impl RelayTransport {
    pub fn new(url: &str) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .map_err(|e| NotifierError::RelayUnavailable(e.to_string()))?;
        Ok(Self { client, url: url.to_string() })
    }
}

impl MailTransport for RelayTransport {
    fn send(&self, message: MailMessage) -> BoxFuture<'static, Result<(), NotifierError>> {
        let request = self.client.post(&self.url).json(&message);
        Box::pin(async move {
            let response = request.send().await.map_err(|e| NotifierError::RelayUnavailable(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                let text = response.text().await.unwrap_or_default();
                Err(NotifierError::Rejected(format!("{status}. {text}")))
            }
        })
    }
}

/// Writes messages to the log. Used when no relay is configured.
#[derive(Clone, Copy, Default)]
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn send(&self, message: MailMessage) -> BoxFuture<'static, Result<(), NotifierError>> {
        info!("📬️ [mail to {:?}] {}\n{}", message.to, message.subject, message.body);
        Box::pin(futures::future::ready(Ok(())))
    }
}

#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    operator_email: Option<String>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MailTransport>, operator_email: Option<String>) -> Self {
        Self { transport, operator_email }
    }

    /// Uses the relay if one is configured, and the log otherwise.
    pub fn from_config(config: &NotifierConfig) -> Result<Self, NotifierError> {
        let transport: Arc<dyn MailTransport> = match &config.mail_relay_url {
            Some(url) => {
                info!("📬️ Notifications will be sent via the mail relay at {url}");
                Arc::new(RelayTransport::new(url)?)
            },
            None => {
                warn!("📬️ No mail relay is configured. Notifications will only be logged.");
                Arc::new(LogTransport)
            },
        };
        if config.operator_email.is_none() {
            warn!("📬️ No operator email is configured. Operator alerts will only be logged.");
        }
        Ok(Self::new(transport, config.operator_email.clone()))
    }

    pub async fn notify_order_paid(&self, order: &Order) {
        let amount = display_amount(order);
        let body = format!(
            "Thank you for your order {}. We have received your payment of {amount} {}.",
            order.order_number, order.currency
        );
        let subject = format!("Payment received for order {}", order.order_number);
        self.deliver(MailMessage::new(Recipient::Customer(order.customer_id.clone()), &subject, body)).await;
    }

    pub async fn notify_payment_failed(&self, order: &Order, reason: &str) {
        let body = format!(
            "Your payment for order {} did not go through ({reason}). No money has been taken. You can try again from \
             your order page.",
            order.order_number
        );
        let subject = format!("Payment failed for order {}", order.order_number);
        self.deliver(MailMessage::new(Recipient::Customer(order.customer_id.clone()), &subject, body)).await;
    }

    pub async fn notify_refund(&self, order: &Order, refund_id: &str, amount: MinorUnits) {
        let body = format!(
            "A refund of {amount} {} for order {} has been processed (reference {refund_id}). It can take a few days \
             to appear on your statement.",
            order.currency, order.order_number
        );
        let subject = format!("Refund processed for order {}", order.order_number);
        self.deliver(MailMessage::new(Recipient::Customer(order.customer_id.clone()), &subject, body)).await;
    }

    pub async fn notify_operators(&self, subject: &str, body: &str) {
        match &self.operator_email {
            Some(email) => {
                self.deliver(MailMessage::new(Recipient::Operator(email.clone()), subject, body.to_string())).await
            },
            None => warn!("📬️ Operator alert (no operator email configured). {subject}: {body}"),
        }
    }

    async fn deliver(&self, message: MailMessage) {
        let subject = message.subject.clone();
        match self.transport.send(message).await {
            Ok(()) => debug!("📬️ Sent \"{subject}\""),
            Err(e) => warn!("📬️ Could not send \"{subject}\". {e}"),
        }
    }
}

fn display_amount(order: &Order) -> String {
    order.effective_amount().map(|a| a.to_string()).unwrap_or_else(|_| format!("{:.2}", order.total))
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use mockall::mock;
    use settlement_engine::db_types::PaymentStatus;

    use super::*;

    mock! {
        pub Transport {}
        impl MailTransport for Transport {
            fn send(&self, message: MailMessage) -> BoxFuture<'static, Result<(), NotifierError>>;
        }
    }

    fn order() -> Order {
        let now = chrono::Utc::now();
        Order {
            id: 7,
            order_number: "ORD-7".into(),
            customer_id: "cust-7".into(),
            amount: Some(MinorUnits::from(50_000)),
            total: 500.0,
            currency: "INR".into(),
            payment_status: PaymentStatus::Paid,
            gateway_order_id: Some("order_abc".into()),
            gateway_payment_id: Some("pay_abc".into()),
            gateway_signature: None,
            payment_method: Some("upi".into()),
            paid_at: Some(now),
            refund_id: None,
            refund_status: None,
            refund_amount: None,
            total_refunded: MinorUnits::from(0),
            refunded_at: None,
            refund_error: None,
            payment_attempts: 0,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn customer_messages_go_to_the_customer() {
        let _ = env_logger::try_init();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let s2 = sent.clone();
        let mut transport = MockTransport::new();
        transport.expect_send().times(2).returning(move |msg| {
            s2.lock().unwrap().push(msg);
            Box::pin(futures::future::ready(Ok(())))
        });
        let notifier = Notifier::new(Arc::new(transport), None);
        notifier.notify_order_paid(&order()).await;
        notifier.notify_refund(&order(), "rfnd_1", MinorUnits::from(20_000)).await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].to, Recipient::Customer("cust-7".into()));
        assert_eq!(sent[0].subject, "Payment received for order ORD-7");
        assert!(sent[1].body.contains("rfnd_1"));
    }

    #[tokio::test]
    async fn delivery_errors_are_swallowed() {
        let _ = env_logger::try_init();
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Box::pin(futures::future::ready(Err(NotifierError::RelayUnavailable("down".into())))));
        let notifier = Notifier::new(Arc::new(transport), None);
        notifier.notify_payment_failed(&order(), "card declined").await;
    }

    #[tokio::test]
    async fn operator_alerts_need_an_operator_address() {
        let _ = env_logger::try_init();
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let notifier = Notifier::new(Arc::new(transport), None);
        notifier.notify_operators("Missing payment webhook", "order 7").await;

        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|msg| msg.to == Recipient::Operator("ops@example.com".into()))
            .times(1)
            .returning(|_| Box::pin(futures::future::ready(Ok(()))));
        let notifier = Notifier::new(Arc::new(transport), Some("ops@example.com".into()));
        notifier.notify_operators("Missing payment webhook", "order 7").await;
    }
}
