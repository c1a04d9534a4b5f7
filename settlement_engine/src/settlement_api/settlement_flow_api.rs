use std::fmt::Debug;

use chrono::{Duration, Utc};
use gateway_tools::{GatewayPayment, GatewayRefund, NewGatewayOrder, NewRefund};
use log::*;

use crate::{
    db_types::{
        MinorUnits,
        NewGatewayEvent,
        NewOrder,
        Order,
        OrderUpdate,
        PaymentStatus,
        RefundGuard,
        RefundStatus,
        TransitionGuard,
    },
    events::{
        EventProducers,
        FraudAlertEvent,
        OperatorAlertEvent,
        OrderPaidEvent,
        PaymentConfirmedEvent,
        PaymentFailedEvent,
        RefundProcessedEvent,
    },
    helpers::{confirmation_message, resolve_event_id, verify_signature, WebhookEnvelope, WebhookEventType},
    settlement_api::{
        errors::SettlementError,
        settlement_objects::{
            ConfirmationResult,
            GatewayCheckout,
            PaymentConfirmation,
            PaymentSummary,
            Principal,
            RefundRequest,
            RefundTicket,
            SettlementOptions,
            StaleVerification,
            WebhookOutcome,
            WebhookReceipt,
        },
    },
    traits::{PaymentGateway, SettlementDatabase},
};

/// A `refund.processed` transition is retried this many times when a concurrent refund moves the running total
/// underneath it.
const REFUND_APPLY_ATTEMPTS: usize = 3;

/// A webhook claim that has not finished after this long is presumed abandoned, and a redelivery may take it over.
const EVENT_CLAIM_LEASE_SECS: i64 = 300;

/// `SettlementApi` drives an order's payment state from three entry points: gateway order creation, the customer's
/// payment confirmation, and gateway webhooks. Refunds are issued through it too.
///
/// Every state change is a single conditional write against the order store (see
/// [`SettlementDatabase::update_order_if`]). Nothing here holds a lock, and any entry point may run concurrently with
/// any other for the same order. "Already settled" is always treated as success.
pub struct SettlementApi<B, G> {
    db: B,
    gateway: G,
    options: SettlementOptions,
    producers: EventProducers,
}

impl<B, G> Debug for SettlementApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B, G> SettlementApi<B, G> {
    pub fn new(db: B, gateway: G, options: SettlementOptions, producers: EventProducers) -> Self {
        Self { db, gateway, options, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn options(&self) -> &SettlementOptions {
        &self.options
    }
}

impl<B, G> SettlementApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    /// Stores a new order. It starts out `PENDING`.
    pub async fn insert_order(&self, order: NewOrder) -> Result<Order, SettlementError> {
        let order = self.db.insert_order(order).await?;
        debug!("🔄️📦️ Order {} created for customer {}", order.order_number, order.customer_id);
        Ok(order)
    }

    /// Creates the gateway-side order for a `PENDING` order and moves it to `CREATED`.
    ///
    /// The amount sent to the gateway always comes from the order store, never from the caller. If the gateway call
    /// fails, the order is left as it was.
    pub async fn create_gateway_order(
        &self,
        order_id: i64,
        principal: &Principal,
    ) -> Result<GatewayCheckout, SettlementError> {
        let order = self.fetch_order(order_id).await?;
        self.check_owner(&order, principal)?;
        if order.payment_status != PaymentStatus::Pending {
            debug!("🔄️💳️ Order {order_id} already has a gateway order ({}).", order.payment_status);
            return Err(SettlementError::conflict(order_id, order.payment_status, "create a gateway order for"));
        }
        let amount = order.effective_amount()?;
        if amount < self.options.min_amount {
            return Err(SettlementError::Validation(format!(
                "The order amount {amount} is below the minimum of {}",
                self.options.min_amount
            )));
        }
        let request = NewGatewayOrder::new(amount, &order.currency, &order.order_number)
            .with_note("order_id", &order.id.to_string());
        let remote = self.gateway.create_order(&request).await?;
        if remote.amount != amount {
            warn!(
                "🔄️💳️ Gateway order {} was created for {} but we asked for {amount}. Using our amount.",
                remote.id, remote.amount
            );
        }
        let update = OrderUpdate::default().with_status(PaymentStatus::Created).with_gateway_order(&remote.id, amount);
        let guard = TransitionGuard::from_status(&[PaymentStatus::Pending]);
        match self.db.update_order_if(order_id, &guard, update).await? {
            Some(updated) => {
                info!("🔄️💳️ Order {order_id} is now CREATED with gateway order {}", remote.id);
                Ok(GatewayCheckout {
                    order_id,
                    gateway_order_id: remote.id,
                    amount,
                    currency: updated.currency,
                    key_id: self.gateway.key_id().to_string(),
                })
            },
            None => {
                let current = self.fetch_order(order_id).await?;
                warn!(
                    "🔄️💳️ Order {order_id} moved to {} while gateway order {} was being created. The gateway order \
                     will never be paid.",
                    current.payment_status, remote.id
                );
                Err(SettlementError::conflict(order_id, current.payment_status, "create a gateway order for"))
            },
        }
    }

    /// Handles the customer's claim that they paid.
    ///
    /// The claim is advisory: it can move the order to `VERIFICATION_PENDING`, never to `PAID`. If the webhook got
    /// there first, this is a successful no-op.
    pub async fn confirm_payment(
        &self,
        principal: &Principal,
        confirmation: PaymentConfirmation,
    ) -> Result<ConfirmationResult, SettlementError> {
        let PaymentConfirmation { order_id, gateway_order_id, gateway_payment_id, gateway_signature } = confirmation;
        let message = confirmation_message(&gateway_order_id, &gateway_payment_id);
        if !verify_signature(self.options.payment_secret.as_bytes(), message.as_bytes(), &gateway_signature) {
            warn!("🔐️ Invalid payment signature for order {order_id} from {}", principal.customer_id);
            return Err(SettlementError::InvalidSignature);
        }
        let order = self.fetch_order(order_id).await?;
        self.check_owner(&order, principal)?;
        if order.gateway_order_id.as_deref() != Some(gateway_order_id.as_str()) {
            warn!(
                "🚨️ Confirmation for order {order_id} names gateway order {gateway_order_id}, but the order is \
                 linked to {:?}",
                order.gateway_order_id
            );
            return Err(SettlementError::Validation(format!(
                "Gateway order {gateway_order_id} does not belong to order {order_id}"
            )));
        }
        if order.payment_status.is_settled() {
            debug!("🔄️✅️ Order {order_id} is already {}. Nothing to confirm.", order.payment_status);
            return Ok(already_settled(&order));
        }
        if !matches!(order.payment_status, PaymentStatus::Created | PaymentStatus::VerificationPending) {
            return Err(SettlementError::conflict(order_id, order.payment_status, "confirm a payment for"));
        }
        let expected = order.effective_amount()?;
        let payment = self.gateway.fetch_payment(&gateway_payment_id).await?;
        if payment.order_id.as_deref() != Some(gateway_order_id.as_str()) {
            let reason = format!(
                "Payment {gateway_payment_id} belongs to gateway order {:?}, not {gateway_order_id}",
                payment.order_id
            );
            return Err(self.fraud_suspected(&order, "client confirmation", expected, &payment, reason));
        }
        if !payment.is_captured() {
            return Err(SettlementError::Validation(format!(
                "Payment {gateway_payment_id} has not been captured. The gateway reports {:?}",
                payment.status
            )));
        }
        if let Some(reason) = mismatch(&order, expected, &payment) {
            return Err(self.fraud_suspected(&order, "client confirmation", expected, &payment, reason));
        }
        let update = OrderUpdate::default()
            .with_status(PaymentStatus::VerificationPending)
            .with_confirmation(&gateway_payment_id, &gateway_signature);
        let guard = TransitionGuard::from_status(&[PaymentStatus::Created, PaymentStatus::VerificationPending]);
        match self.db.update_order_if(order_id, &guard, update).await? {
            Some(updated) => {
                info!("🔄️✅️ Payment {gateway_payment_id} for order {order_id} verified. Waiting for the gateway.");
                self.producers.publish_payment_confirmed(PaymentConfirmedEvent::new(updated.clone()));
                Ok(ConfirmationResult {
                    order_id,
                    status: updated.payment_status,
                    already_settled: false,
                    message: "Payment verified. The order will be marked as paid once the gateway confirms it."
                        .to_string(),
                })
            },
            None => {
                let current = self.fetch_order(order_id).await?;
                if current.payment_status.is_settled() {
                    debug!("🔄️✅️ Order {order_id} was settled while the confirmation was being checked");
                    Ok(already_settled(&current))
                } else {
                    Err(SettlementError::conflict(order_id, current.payment_status, "confirm a payment for"))
                }
            },
        }
    }

    /// Processes a webhook delivery.
    ///
    /// `body` must be the request body exactly as received; the signature covers those bytes. An invalid signature is
    /// the only error that leaves no trace in the ledger. Once an event is recorded this returns `Ok`, whether or not
    /// its side effects succeeded; failures are stored on the ledger entry and the gateway's redelivery is the retry
    /// path.
    pub async fn process_webhook(
        &self,
        body: &[u8],
        signature: &str,
        event_id_hint: Option<&str>,
    ) -> Result<WebhookReceipt, SettlementError> {
        if !verify_signature(self.options.webhook_secret.as_bytes(), body, signature) {
            warn!("🔐️ Webhook delivery with an invalid signature was rejected");
            return Err(SettlementError::InvalidSignature);
        }
        let envelope = WebhookEnvelope::from_slice(body);
        let (envelope_id, event_type) = match &envelope {
            Ok(env) => (env.id.as_deref(), env.event.clone()),
            Err(_) => (None, "unparseable".to_string()),
        };
        let event_id = resolve_event_id(event_id_hint, envelope_id, body);
        let payload = String::from_utf8_lossy(body).into_owned();
        let (record, existed) = self.db.record_if_new(NewGatewayEvent::new(&event_id, &event_type, payload)).await?;
        if existed && record.is_settled() {
            info!("🔄️📬️ Event {event_id} ({event_type}) was already processed. Skipping.");
            return Ok(WebhookReceipt {
                event_id,
                event_type,
                duplicate: true,
                outcome: WebhookOutcome::NoOp("Event already processed".to_string()),
            });
        }
        if self.db.claim_event(&event_id, Duration::seconds(EVENT_CLAIM_LEASE_SECS)).await?.is_none() {
            info!("🔄️📬️ Event {event_id} ({event_type}) is being handled by another delivery. Skipping.");
            return Ok(WebhookReceipt {
                event_id,
                event_type,
                duplicate: true,
                outcome: WebhookOutcome::NoOp("Event is already being processed".to_string()),
            });
        }
        let outcome = match envelope {
            Ok(env) => match self.apply_event(&env).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("🔄️📬️ Event {event_id} ({event_type}) could not be applied. {e}");
                    WebhookOutcome::Failed(e.to_string())
                },
            },
            Err(e) => {
                warn!("🔄️📬️ Event {event_id} has a valid signature but could not be parsed. {e}");
                WebhookOutcome::Failed(format!("Malformed event body. {e}"))
            },
        };
        if let Err(e) = self.db.mark_processed(&event_id, outcome.error()).await {
            error!("🔄️📬️ Event {event_id} was handled ({outcome:?}) but could not be marked as processed. {e}");
        }
        debug!("🔄️📬️ Event {event_id} ({event_type}) handled. {outcome:?}");
        Ok(WebhookReceipt { event_id, event_type, duplicate: existed, outcome })
    }

    /// Issues a refund through the gateway.
    ///
    /// The refund is reserved on the order first, so two refunds can never be in flight at once. The order's payment
    /// status is not touched here; it moves when the gateway's `refund.processed` webhook arrives.
    pub async fn request_refund(&self, order_id: i64, request: RefundRequest) -> Result<RefundTicket, SettlementError> {
        let order = self.fetch_order(order_id).await?;
        if !order.payment_status.is_refundable() {
            return Err(SettlementError::conflict(order_id, order.payment_status, "refund"));
        }
        let payment_id = order.gateway_payment_id.clone().ok_or_else(|| {
            SettlementError::Validation(format!("Order {order_id} has no captured payment to refund"))
        })?;
        let amount = order.effective_amount()?;
        let remaining = amount - order.total_refunded;
        let refund_amount = request.amount.unwrap_or(remaining);
        if !refund_amount.is_positive() {
            return Err(SettlementError::Validation(format!("Refund amount must be positive, got {refund_amount}")));
        }
        if refund_amount > remaining {
            return Err(SettlementError::Validation(format!(
                "Cannot refund {refund_amount}. Only {remaining} of order {order_id} has not been refunded yet"
            )));
        }
        let reserve = OrderUpdate::default()
            .with_refund_status(RefundStatus::Pending)
            .with_refund_error(None)
            .with_metadata("pending_refund_amount", &refund_amount.value().to_string());
        let guard = TransitionGuard::from_status(&[PaymentStatus::Paid, PaymentStatus::PartiallyRefunded])
            .with_refund_guard(RefundGuard::NoneInFlight);
        if self.db.update_order_if(order_id, &guard, reserve).await?.is_none() {
            let current = self.fetch_order(order_id).await?;
            debug!("🔄️💸️ Refund for order {order_id} refused. Refund status: {:?}", current.refund_status);
            return Err(SettlementError::conflict(order_id, current.payment_status, "start a refund for"));
        }
        let mut refund = NewRefund::new(refund_amount);
        refund.receipt = Some(order.order_number.clone());
        if let Some(reason) = &request.reason {
            refund = refund.with_reason(reason);
        }
        let in_flight = TransitionGuard::from_status(&[
            PaymentStatus::Paid,
            PaymentStatus::PartiallyRefunded,
            PaymentStatus::Refunded,
        ])
        .with_refund_guard(RefundGuard::InFlight);
        match self.gateway.create_refund(&payment_id, &refund).await {
            Ok(issued) => {
                info!("🔄️💸️ Refund {} of {refund_amount} issued for order {order_id}", issued.id);
                let update = OrderUpdate::default().with_refund_id(&issued.id);
                match self.db.update_order_if(order_id, &in_flight, update).await {
                    Ok(Some(_)) => trace!("🔄️💸️ Refund {} recorded on order {order_id}", issued.id),
                    Ok(None) => debug!("🔄️💸️ The webhook for refund {} got here first", issued.id),
                    Err(e) => error!("🔄️💸️ Refund {} was issued but could not be recorded. {e}", issued.id),
                }
                Ok(RefundTicket {
                    order_id,
                    refund_id: issued.id,
                    refund_status: RefundStatus::Pending,
                    gateway_status: issued.status,
                    amount: issued.amount,
                })
            },
            Err(e) => {
                warn!("🔄️💸️ Refund for order {order_id} failed at the gateway. {e}");
                let release = OrderUpdate::default()
                    .with_refund_status(RefundStatus::Failed)
                    .with_refund_error(Some(e.description()));
                if let Err(db_err) = self.db.update_order_if(order_id, &in_flight, release).await {
                    error!("🔄️💸️ Could not release the refund reservation on order {order_id}. {db_err}");
                }
                Err(e.into())
            },
        }
    }

    /// The payment view of an order. Customers can only see their own orders; admins can see all of them.
    pub async fn fetch_payment_summary(
        &self,
        order_id: i64,
        principal: &Principal,
    ) -> Result<PaymentSummary, SettlementError> {
        let order = self.fetch_order(order_id).await?;
        if !principal.is_admin {
            self.check_owner(&order, principal)?;
        }
        let amount = order.effective_amount()?;
        Ok(PaymentSummary::new(&order, amount))
    }

    /// Asks the gateway about orders that have been waiting on a webhook for longer than `older_than`.
    ///
    /// This never changes an order. If the gateway says an order is paid, operators are alerted, since it means a
    /// webhook went missing.
    pub async fn review_stale_verifications(
        &self,
        older_than: Duration,
    ) -> Result<Vec<StaleVerification>, SettlementError> {
        let stale = self.db.fetch_stale_orders(PaymentStatus::VerificationPending, older_than).await?;
        let mut result = Vec::with_capacity(stale.len());
        for order in stale {
            let Some(gateway_order_id) = order.gateway_order_id.clone() else {
                warn!("🔄️🕰️ Order {} is awaiting verification but has no gateway order", order.id);
                result.push(StaleVerification {
                    order_id: order.id,
                    gateway_order_id: None,
                    remote_status: None,
                    remote_paid: false,
                });
                continue;
            };
            let report = match self.gateway.fetch_order(&gateway_order_id).await {
                Ok(remote) => {
                    let remote_paid = remote.is_paid();
                    if remote_paid {
                        warn!(
                            "🔄️🕰️ Gateway reports order {} ({gateway_order_id}) as paid, but no capture webhook has \
                             arrived",
                            order.id
                        );
                        let message = format!(
                            "Order {} ({}) has been awaiting verification since {}. The gateway reports gateway \
                             order {gateway_order_id} as paid ({} of {}). Check the webhook configuration.",
                            order.id, order.order_number, order.updated_at, remote.amount_paid, remote.amount
                        );
                        let alert = OperatorAlertEvent::new("Missing payment webhook", &message, Some(order.id));
                        self.producers.publish_operator_alert(alert);
                    } else {
                        debug!("🔄️🕰️ Order {} is still {} at the gateway", order.id, remote.status);
                    }
                    StaleVerification {
                        order_id: order.id,
                        gateway_order_id: Some(gateway_order_id),
                        remote_status: Some(remote.status),
                        remote_paid,
                    }
                },
                Err(e) => {
                    warn!("🔄️🕰️ Could not fetch gateway order {gateway_order_id} for order {}. {e}", order.id);
                    StaleVerification {
                        order_id: order.id,
                        gateway_order_id: Some(gateway_order_id),
                        remote_status: None,
                        remote_paid: false,
                    }
                },
            };
            result.push(report);
        }
        Ok(result)
    }

    async fn apply_event(&self, envelope: &WebhookEnvelope) -> Result<WebhookOutcome, SettlementError> {
        match envelope.event_type() {
            WebhookEventType::PaymentCaptured => {
                let payment = envelope.payment().ok_or_else(|| missing_entity("payment"))?;
                self.apply_capture(payment).await
            },
            WebhookEventType::PaymentFailed => {
                let payment = envelope.payment().ok_or_else(|| missing_entity("payment"))?;
                self.apply_payment_failure(payment).await
            },
            WebhookEventType::RefundProcessed => {
                let refund = envelope.refund().ok_or_else(|| missing_entity("refund"))?;
                self.apply_refund(refund).await
            },
            WebhookEventType::RefundFailed => {
                let refund = envelope.refund().ok_or_else(|| missing_entity("refund"))?;
                self.apply_refund_failure(refund).await
            },
            WebhookEventType::Other(event) => {
                trace!("🔄️📬️ Ignoring {event} event");
                Ok(WebhookOutcome::Ignored)
            },
        }
    }

    async fn apply_capture(&self, payment: &GatewayPayment) -> Result<WebhookOutcome, SettlementError> {
        let order = self.order_for_payment(payment).await?;
        if order.payment_status.is_settled() {
            debug!("🔄️💰️ Order {} is already {}. Capture {} is a no-op.", order.id, order.payment_status, payment.id);
            return Ok(WebhookOutcome::NoOp(format!("Order is already {}", order.payment_status)));
        }
        let expected = order.effective_amount()?;
        if let Some(reason) = mismatch(&order, expected, payment) {
            return Err(self.fraud_suspected(&order, "webhook", expected, payment, reason));
        }
        let update = OrderUpdate::default().with_status(PaymentStatus::Paid).with_capture(
            &payment.id,
            payment.method.clone(),
            Utc::now(),
        );
        let guard = TransitionGuard::from_status(&[
            PaymentStatus::Created,
            PaymentStatus::VerificationPending,
            PaymentStatus::Failed,
        ]);
        match self.db.update_order_if(order.id, &guard, update).await? {
            Some(paid) => {
                info!("🔄️💰️ Order {} ({}) is PAID. Payment {}", paid.id, paid.order_number, payment.id);
                self.producers.publish_order_paid(OrderPaidEvent::new(paid));
                Ok(WebhookOutcome::Applied(PaymentStatus::Paid))
            },
            None => {
                let current = self.fetch_order(order.id).await?;
                if current.payment_status.is_settled() {
                    Ok(WebhookOutcome::NoOp(format!("Order is already {}", current.payment_status)))
                } else {
                    Err(SettlementError::conflict(order.id, current.payment_status, "mark as paid"))
                }
            },
        }
    }

    async fn apply_payment_failure(&self, payment: &GatewayPayment) -> Result<WebhookOutcome, SettlementError> {
        let order = self.order_for_payment(payment).await?;
        if order.payment_status.is_settled() {
            debug!("🔄️❌️ Ignoring failed payment {} for settled order {}", payment.id, order.id);
            return Ok(WebhookOutcome::NoOp(format!("Order is already {}", order.payment_status)));
        }
        let reason = payment
            .error_description
            .clone()
            .or_else(|| payment.error_code.clone())
            .unwrap_or_else(|| "Payment failed".to_string());
        let update = OrderUpdate::default()
            .with_status(PaymentStatus::Failed)
            .increment_attempts()
            .with_metadata("last_failure_reason", &reason)
            .with_metadata("last_failed_payment_id", &payment.id);
        let guard = TransitionGuard::from_status(&[
            PaymentStatus::Created,
            PaymentStatus::VerificationPending,
            PaymentStatus::Failed,
        ]);
        match self.db.update_order_if(order.id, &guard, update).await? {
            Some(failed) => {
                let high_value = failed.effective_amount()? > self.options.high_value_threshold;
                info!(
                    "🔄️❌️ Payment {} for order {} failed (attempt {}). {reason}",
                    payment.id, failed.id, failed.payment_attempts
                );
                self.producers.publish_payment_failed(PaymentFailedEvent::new(failed, &reason, high_value));
                Ok(WebhookOutcome::Applied(PaymentStatus::Failed))
            },
            None => {
                let current = self.fetch_order(order.id).await?;
                if current.payment_status.is_settled() {
                    Ok(WebhookOutcome::NoOp(format!("Order is already {}", current.payment_status)))
                } else {
                    Err(SettlementError::conflict(order.id, current.payment_status, "mark as failed"))
                }
            },
        }
    }

    async fn apply_refund(&self, refund: &GatewayRefund) -> Result<WebhookOutcome, SettlementError> {
        if !refund.amount.is_positive() {
            return Err(SettlementError::Validation(format!("Refund {} has amount {}", refund.id, refund.amount)));
        }
        let mut order = self.order_for_refund(refund).await?;
        for _ in 0..REFUND_APPLY_ATTEMPTS {
            if order.refund_id.as_deref() == Some(refund.id.as_str()) &&
                order.refund_status == Some(RefundStatus::Processed)
            {
                return Ok(WebhookOutcome::NoOp(format!("Refund {} was already applied", refund.id)));
            }
            if !order.payment_status.is_refundable() {
                return Err(SettlementError::conflict(order.id, order.payment_status, "apply a refund to"));
            }
            let amount = order.effective_amount()?;
            let new_total = order.total_refunded + refund.amount;
            // Over-refunds are classified as full refunds
            let status = if new_total >= amount { PaymentStatus::Refunded } else { PaymentStatus::PartiallyRefunded };
            let update = OrderUpdate::default()
                .with_status(status)
                .with_refund_id(&refund.id)
                .with_refund_settled(refund.amount, Utc::now());
            let guard = TransitionGuard::from_status(&[PaymentStatus::Paid, PaymentStatus::PartiallyRefunded])
                .with_refund_guard(RefundGuard::NotYetApplied {
                    refund_id: refund.id.clone(),
                    total_refunded: order.total_refunded,
                });
            if let Some(updated) = self.db.update_order_if(order.id, &guard, update).await? {
                info!(
                    "🔄️💸️ Refund {} of {} applied to order {}. Status: {status}. Refunded so far: {}",
                    refund.id, refund.amount, updated.id, updated.total_refunded
                );
                self.producers.publish_refund_processed(RefundProcessedEvent::new(updated, &refund.id, refund.amount));
                return Ok(WebhookOutcome::Applied(status));
            }
            debug!("🔄️💸️ Order {} changed while refund {} was being applied. Retrying.", order.id, refund.id);
            order = self.fetch_order(order.id).await?;
        }
        Err(SettlementError::conflict(order.id, order.payment_status, "apply a refund to"))
    }

    async fn apply_refund_failure(&self, refund: &GatewayRefund) -> Result<WebhookOutcome, SettlementError> {
        let order = self.order_for_refund(refund).await?;
        let error = format!("The gateway reported refund {} of {} as failed", refund.id, refund.amount);
        let update = OrderUpdate::default()
            .with_refund_status(RefundStatus::Failed)
            .with_refund_id(&refund.id)
            .with_refund_error(Some(error.clone()));
        let guard = TransitionGuard::from_status(&[
            PaymentStatus::Paid,
            PaymentStatus::PartiallyRefunded,
            PaymentStatus::Refunded,
        ])
        .with_refund_guard(RefundGuard::MatchesOrPending(refund.id.clone()));
        match self.db.update_order_if(order.id, &guard, update).await? {
            Some(updated) => {
                warn!(
                    "🔄️💸️ Refund {} for order {} failed. Payment status stays {}",
                    refund.id, updated.id, updated.payment_status
                );
                let alert = OperatorAlertEvent::new("Refund failed", &error, Some(updated.id));
                self.producers.publish_operator_alert(alert);
                Ok(WebhookOutcome::Applied(updated.payment_status))
            },
            None => Ok(WebhookOutcome::NoOp(format!("Refund {} is not the refund on record", refund.id))),
        }
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Order, SettlementError> {
        self.db.fetch_order_by_id(order_id).await?.ok_or(SettlementError::OrderNotFound(order_id))
    }

    async fn order_for_payment(&self, payment: &GatewayPayment) -> Result<Order, SettlementError> {
        if let Some(gateway_order_id) = &payment.order_id {
            if let Some(order) = self.db.fetch_order_by_gateway_order_id(gateway_order_id).await? {
                return Ok(order);
            }
        }
        self.db.fetch_order_by_gateway_payment_id(&payment.id).await?.ok_or_else(|| {
            SettlementError::Validation(format!(
                "No order matches payment {} (gateway order {:?})",
                payment.id, payment.order_id
            ))
        })
    }

    async fn order_for_refund(&self, refund: &GatewayRefund) -> Result<Order, SettlementError> {
        if let Some(order) = self.db.fetch_order_by_refund_id(&refund.id).await? {
            return Ok(order);
        }
        self.db.fetch_order_by_gateway_payment_id(&refund.payment_id).await?.ok_or_else(|| {
            SettlementError::Validation(format!("No order matches refund {} (payment {})", refund.id, refund.payment_id))
        })
    }

    fn check_owner(&self, order: &Order, principal: &Principal) -> Result<(), SettlementError> {
        if order.is_owned_by(&principal.customer_id) {
            Ok(())
        } else {
            warn!(
                "🚨️ {} tried to act on order {}, which belongs to someone else",
                principal.customer_id, order.id
            );
            Err(SettlementError::NotOwner(order.id))
        }
    }

    fn fraud_suspected(
        &self,
        order: &Order,
        context: &str,
        expected: MinorUnits,
        payment: &GatewayPayment,
        reason: String,
    ) -> SettlementError {
        error!(
            "🚨️ Possible fraud on order {} ({}) during {context}. {reason}. Payment: {}, reported {} {}",
            order.id, order.order_number, payment.id, payment.amount, payment.currency
        );
        let alert = FraudAlertEvent::for_order(order, context, expected, payment.amount, &payment.currency);
        self.producers.publish_fraud_alert(alert);
        SettlementError::FraudSuspect { order_id: order.id, reason }
    }
}

fn already_settled(order: &Order) -> ConfirmationResult {
    ConfirmationResult {
        order_id: order.id,
        status: order.payment_status,
        already_settled: true,
        message: format!("Order is already {}", order.payment_status),
    }
}

/// Describes how the gateway's payment differs from the order, if it does. Amounts must match exactly.
fn mismatch(order: &Order, expected: MinorUnits, payment: &GatewayPayment) -> Option<String> {
    if payment.amount != expected {
        return Some(format!("Expected {expected} but the gateway reports {}", payment.amount));
    }
    if !payment.currency.eq_ignore_ascii_case(&order.currency) {
        return Some(format!("Expected currency {} but the gateway reports {}", order.currency, payment.currency));
    }
    None
}

fn missing_entity(name: &str) -> SettlementError {
    SettlementError::Validation(format!("The event carries no {name} entity"))
}
