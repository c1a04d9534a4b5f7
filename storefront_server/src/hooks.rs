//! Event handlers wired into the settlement engine: customer emails, operator alerts and cart clearing.
use std::sync::Arc;

use log::*;
use settlement_engine::{events::EventHooks, CartManagement, SqliteDatabase};

use crate::notifier::Notifier;

pub fn settlement_hooks(notifier: Notifier, carts: SqliteDatabase) -> EventHooks {
    let notifier = Arc::new(notifier);
    let mut hooks = EventHooks::default();

    let (n, db) = (notifier.clone(), carts.clone());
    hooks.on_order_paid(move |ev| {
        let (n, db) = (n.clone(), db.clone());
        Box::pin(async move {
            info!("📬️ Order {} is paid", ev.order.order_number);
            // The webhook may beat the browser's confirmation, in which case nobody else clears the cart.
            clear_cart(&db, &ev.order.customer_id).await;
            n.notify_order_paid(&ev.order).await;
        })
    });

    let db = carts;
    hooks.on_payment_confirmed(move |ev| {
        let db = db.clone();
        Box::pin(async move {
            debug!("📬️ Payment for order {} confirmed by the customer", ev.order.order_number);
            clear_cart(&db, &ev.order.customer_id).await;
        })
    });

    let n = notifier.clone();
    hooks.on_payment_failed(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            info!("📬️ Payment for order {} failed. {}", ev.order.order_number, ev.reason);
            n.notify_payment_failed(&ev.order, &ev.reason).await;
            if ev.high_value {
                let subject = format!("High-value payment failed: order {}", ev.order.order_number);
                let body = format!(
                    "Payment for order {} (customer {}, {} {}) failed. Reason: {}. Attempts so far: {}.",
                    ev.order.order_number,
                    ev.order.customer_id,
                    ev.order.amount.map(|a| a.to_string()).unwrap_or_else(|| format!("{:.2}", ev.order.total)),
                    ev.order.currency,
                    ev.reason,
                    ev.order.payment_attempts
                );
                n.notify_operators(&subject, &body).await;
            }
        })
    });

    let n = notifier.clone();
    hooks.on_refund_processed(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            info!("📬️ Refund {} of {} processed for order {}", ev.refund_id, ev.amount, ev.order.order_number);
            n.notify_refund(&ev.order, &ev.refund_id, ev.amount).await;
        })
    });

    let n = notifier.clone();
    hooks.on_fraud_alert(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            warn!(
                "🚨️ Possible payment fraud on order {} ({}): expected {} {}, gateway reported {} {}",
                ev.order_number,
                ev.context,
                ev.expected,
                ev.expected_currency,
                ev.reported,
                ev.reported_currency
            );
            let subject = format!("🚨 Payment mismatch on order {}", ev.order_number);
            let body = format!(
                "Order {} (id {}): the {} reported {} {} but the order is for {} {}. The order was not marked as \
                 paid.",
                ev.order_number,
                ev.order_id,
                ev.context,
                ev.reported,
                ev.reported_currency,
                ev.expected,
                ev.expected_currency
            );
            n.notify_operators(&subject, &body).await;
        })
    });

    let n = notifier;
    hooks.on_operator_alert(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            let body = match ev.order_id {
                Some(id) => format!("[order {id}] {}", ev.message),
                None => ev.message.clone(),
            };
            n.notify_operators(&ev.subject, &body).await;
        })
    });

    hooks
}

async fn clear_cart(db: &SqliteDatabase, customer_id: &str) {
    match db.clear_cart(customer_id).await {
        Ok(0) => trace!("📬️ Cart for {customer_id} was already empty"),
        Ok(n) => debug!("📬️ Cleared {n} items from the cart of {customer_id}"),
        Err(e) => warn!("📬️ Could not clear the cart of {customer_id}. {e}"),
    }
}
