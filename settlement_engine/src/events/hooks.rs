use std::{future::Future, pin::Pin, sync::Arc};

use paste::paste;

use crate::events::{
    EventHandler,
    EventProducer,
    FraudAlertEvent,
    Handler,
    OperatorAlertEvent,
    OrderPaidEvent,
    PaymentConfirmedEvent,
    PaymentFailedEvent,
    RefundProcessedEvent,
};

macro_rules! event_hooks {
    ($($name:ident: $event:ty),+ $(,)?) => { paste! {
        /// The sending halves of every registered handler. Cloned into each API object that publishes events.
        #[derive(Default, Clone)]
        pub struct EventProducers {
            $(pub [<$name _producer>]: Vec<EventProducer<$event>>,)+
        }

        impl EventProducers {
            $(
            pub fn [<publish_ $name>](&self, event: $event) {
                for producer in &self.[<$name _producer>] {
                    producer.publish_event(event.clone());
                }
            }
            )+
        }

        pub struct EventHandlers {
            $(pub [<on_ $name>]: Option<EventHandler<$event>>,)+
        }

        impl EventHandlers {
            pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
                Self {
                    $([<on_ $name>]: hooks.[<on_ $name>].map(|f| EventHandler::new(buffer_size, f)),)+
                }
            }

            pub fn producers(&self) -> EventProducers {
                let mut result = EventProducers::default();
                $(
                if let Some(handler) = &self.[<on_ $name>] {
                    result.[<$name _producer>].push(handler.subscribe());
                }
                )+
                result
            }

            pub async fn start_handlers(self) {
                $(
                if let Some(handler) = self.[<on_ $name>] {
                    tokio::spawn(async move {
                        handler.start_handler().await;
                    });
                }
                )+
            }
        }

        #[derive(Default, Clone)]
        pub struct EventHooks {
            $(pub [<on_ $name>]: Option<Handler<$event>>,)+
        }

        impl EventHooks {
            $(
            pub fn [<on_ $name>]<F>(&mut self, f: F) -> &mut Self
            where F: (Fn($event) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
                self.[<on_ $name>] = Some(Arc::new(f));
                self
            }
            )+
        }
    }};
}

event_hooks! {
    order_paid: OrderPaidEvent,
    payment_confirmed: PaymentConfirmedEvent,
    payment_failed: PaymentFailedEvent,
    refund_processed: RefundProcessedEvent,
    fraud_alert: FraudAlertEvent,
    operator_alert: OperatorAlertEvent,
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test]
    async fn only_registered_hooks_get_producers() {
        let _ = env_logger::try_init();
        let seen = Arc::new(AtomicUsize::new(0));
        let s2 = seen.clone();
        let mut hooks = EventHooks::default();
        hooks.on_operator_alert(move |ev| {
            let seen = s2.clone();
            Box::pin(async move {
                assert_eq!(ev.subject, "Test");
                seen.fetch_add(1, Ordering::SeqCst);
            })
        });
        let handlers = EventHandlers::new(8, hooks);
        let producers = handlers.producers();
        assert_eq!(producers.operator_alert_producer.len(), 1);
        assert!(producers.order_paid_producer.is_empty());
        producers.publish_operator_alert(OperatorAlertEvent::new("Test", "hello", None));
        drop(producers);
        handlers.start_handlers().await;
        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
