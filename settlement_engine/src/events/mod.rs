//! Settlement events.
//!
//! The settlement flow publishes an event after each state change that someone outside the order store cares about
//! (emails, cart clearing, operator alerts). Handlers run on their own tasks and can never hold up or fail a
//! settlement.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
