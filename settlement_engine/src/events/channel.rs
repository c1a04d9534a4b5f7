//! Bounded queues between the settlement flows and whatever reacts to them.
//!
//! Each kind of settlement event gets its own [`EventHandler`]: a bounded queue plus one async hook. The flows hold
//! [`EventProducer`]s and publish without waiting, so a slow mail relay can never hold up a payment. When a queue is
//! full the event is dropped and logged. Hooks see only the event, never the state of the engine.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::{JoinError, JoinSet},
};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Runs a hook for every event that arrives on its queue. Each event is handled on its own task.
pub struct EventHandler<E: Send + Sync + 'static> {
    queue: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    hook: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, hook: Handler<E>) -> Self {
        let (sender, queue) = mpsc::channel(buffer_size.max(1));
        Self { queue, sender, hook }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Drains the queue until every producer is gone, then waits for the hooks still running.
    pub async fn start_handler(self) {
        let Self { mut queue, sender, hook } = self;
        // Only the producers may keep the queue open
        drop(sender);
        debug!("📬️ Settlement event queue is open");
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                event = queue.recv() => match event {
                    Some(event) => {
                        let hook = Arc::clone(&hook);
                        in_flight.spawn(async move { (hook)(event).await });
                    },
                    None => break,
                },
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => report_hook(done),
            }
        }
        if !in_flight.is_empty() {
            debug!("📬️ Queue closed. Waiting for {} notification hooks to finish", in_flight.len());
        }
        while let Some(done) = in_flight.join_next().await {
            report_hook(done);
        }
        debug!("📬️ Settlement event queue is closed");
    }
}

fn report_hook(done: Result<(), JoinError>) {
    match done {
        Ok(()) => trace!("📬️ Hook finished"),
        Err(e) if e.is_panic() => error!("📬️ A settlement event hook panicked. {e}"),
        Err(e) => warn!("📬️ A settlement event hook was cancelled. {e}"),
    }
}

/// The publishing end of an [`EventHandler`]'s queue.
#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Queues the event for the handler and returns immediately.
    pub fn publish_event(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => error!("📬️ Event queue is full. The event was dropped."),
            Err(TrySendError::Closed(_)) => error!("📬️ Event queue is closed. The event was dropped."),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    };

    use super::*;

    type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

    #[tokio::test]
    async fn every_queued_event_reaches_the_hook() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let seen = total.clone();
        let hook: Handler<u64> = Arc::new(move |amount: u64| {
            let seen = seen.clone();
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                seen.fetch_add(amount, Ordering::SeqCst);
            }) as HookFuture
        });
        let handler = EventHandler::new(16, hook);
        let checkout = handler.subscribe();
        let webhooks = handler.subscribe();
        for amount in [100, 250, 4_000] {
            checkout.publish_event(amount);
            webhooks.publish_event(amount * 2);
        }
        drop(checkout);
        drop(webhooks);
        // Returns only once the slow hooks are done
        handler.start_handler().await;
        assert_eq!(total.load(Ordering::SeqCst), 8_700);
    }

    #[tokio::test]
    async fn a_panicking_hook_does_not_stop_the_queue() {
        let _ = env_logger::try_init();
        let handled = Arc::new(Mutex::new(Vec::new()));
        let log = handled.clone();
        let hook: Handler<u64> = Arc::new(move |order_id: u64| {
            let log = log.clone();
            Box::pin(async move {
                assert_ne!(order_id, 13, "unlucky order");
                log.lock().unwrap().push(order_id);
            }) as HookFuture
        });
        let handler = EventHandler::new(8, hook);
        let producer = handler.subscribe();
        for order_id in [12, 13, 14] {
            producer.publish_event(order_id);
        }
        drop(producer);
        handler.start_handler().await;
        let mut handled = handled.lock().unwrap().clone();
        handled.sort();
        assert_eq!(handled, vec![12, 14]);
    }

    #[tokio::test]
    async fn publishing_to_a_full_queue_does_not_block() {
        let _ = env_logger::try_init();
        let hook: Handler<u64> = Arc::new(|_: u64| Box::pin(async {}) as HookFuture);
        let handler = EventHandler::new(2, hook);
        let producer = handler.subscribe();
        // Nobody is draining the queue yet; the third event is dropped rather than awaited
        for i in 0..3 {
            producer.publish_event(i);
        }
        drop(handler);
        // and publishing after the handler is gone is harmless too
        producer.publish_event(99);
    }
}
